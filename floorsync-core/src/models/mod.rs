pub mod events;
pub mod id;
pub mod lock;
pub mod notification;
pub mod progress;
pub mod room;
pub mod user;

pub use events::{ClientEvent, ServerEvent};
pub use id::{generate_id, ConnectionId, EntityId, UserId};
pub use lock::{Lock, LockType};
pub use notification::{Notification, OrderUpdate, Severity, UpdateType};
pub use progress::{ActionKind, ActionPatch, CurrentItem, LastAction, Progress, ProgressPatch};
pub use room::{RoomKey, RoomState, RoomType, Viewer};
pub use user::UserIdentity;
