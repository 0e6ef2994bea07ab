pub mod extract;
pub mod invoker;
pub mod transport;

pub use extract::extract_json;
pub use invoker::{FallbackPolicy, ModelInvoker};
pub use transport::{fetch_available_models, ChatTransport, HttpChatTransport};
