pub mod errors;
pub mod protocol;
pub mod provider;
pub mod registry;
mod stream;

pub use errors::RelayError;
pub use protocol::{LineDecoder, ModelAnnotation, StreamPart};
pub use provider::{ChatTurn, ProviderAdapter, ProviderAdapters, ProviderError};
pub use registry::{model_name_from_slug, ModelDescriptor, ModelRegistry, ProviderKind};
pub use stream::{RelayHandle, RelayOutcome, RelayRequest, StreamRelay};
