//! Control-plane wire types for lading object transfers.
//!
//! Only the fields the transfer engine reads or writes are modelled here;
//! unknown response fields are ignored on deserialization.

pub mod messages;
pub mod types;

pub use messages::{
    DescribeResponse, DownloadRequest, DownloadResponse, UploadRequest, UploadResponse,
};
pub use types::{DownloadGrant, Headers, TransferTarget, UploadSlot};
