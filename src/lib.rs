pub mod error;
pub mod ethereum;
pub mod http;
pub mod invoice;
pub mod logging;
pub mod watcher;

pub use error::InvoiceError;
