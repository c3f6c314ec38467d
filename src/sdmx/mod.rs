//! SDMX 2.1 registry client: queries, decoding, reference resolution and
//! the pure transformations the crawler runs over fetched structures.

pub mod categories;
pub mod client;
pub mod decode;
pub mod errors;
pub mod fetch;
pub mod middleware;
pub mod models;
pub mod refs;
pub mod resolve;

pub use client::{RegistryTransport, SdmxClient, StructureRequest, StructureType};
pub use decode::{StructureDecoder, XmlDecoder};
pub use errors::{DecodeError, ResolutionError, SdmxError};
pub use fetch::{FailedReference, FanOut, StructureFetcher};
