mod document;
mod session;
mod settings;

pub use document::*;
pub use session::*;
pub use settings::*;
