//! Control-plane client for the object storage API.
//!
//! Implements [`lading_transfer::ControlPlane`] over JSON `POST` routes:
//! `{base}/{object-id}/upload`, `/download` and `/describe`.

pub mod client;

pub use client::{ApiClient, Error};
