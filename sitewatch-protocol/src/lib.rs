//! Federation wire protocol shared by the `/sync` responder and the site
//! scraper: request headers, request signing and the response payload.

pub mod signature;
pub mod sync;

pub use signature::{SignatureError, SignedHeaders};
pub use sync::{SyncEntry, SyncResponse};

pub mod prelude {
    pub use crate::signature::{
        check_timestamp, format_timestamp, sign, sign_request, validate_request, verify,
        SignatureError, SignedHeaders, MAX_CLOCK_SKEW_SECS, SIGNATURE_HEADER, TIMESTAMP_HEADER,
    };
    pub use crate::sync::{build_response, sync_url, SyncEntry, SyncResponse, SYNC_PATH};
}
