pub mod notification;
pub mod request;
mod traits;

pub use notification::{Notification, WindowData};
pub use request::{ConnectKind, EmbedFlags, Hello, Properties, RequestBody, RequestBuilder, RequestMessage};
pub use traits::Message;
