//! Platform webhook ingestion: signature check, typed events, routing.

pub mod events;
pub mod meeting_link;
pub mod router;
pub mod signature;

pub use events::WebhookEvent;
pub use router::EventRouter;
pub use signature::{SignatureVerifier, PLATFORM_SIGNATURE_HEADER, WORKER_SIGNATURE_HEADER};
