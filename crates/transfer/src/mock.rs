//! In-memory control plane and storage service for tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use bytes::Bytes;
use lading_protocol::{
    DescribeResponse, DownloadGrant, DownloadRequest, TransferTarget, UploadRequest, UploadSlot,
};

use crate::checksum::md5_hex;
use crate::control::ControlPlane;
use crate::http::{HttpRequest, HttpResponse, HttpTransport, Method, TransportError};
use crate::{TransferConfig, TransferError};

const BASE: &str = "https://storage.test/";
const GRANT_HEADER: &str = "x-grant";

/// Installs a test-writer subscriber honoring `RUST_LOG`; repeated calls are no-ops.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Small sizes so tests exercise many parts and ramp steps.
pub(crate) fn test_config() -> TransferConfig {
    TransferConfig {
        upload_chunk_size: 8,
        min_download_chunk_size: 4,
        max_download_chunk_size: 32,
        consumer_buffer_size: 10,
        ramp_factor: 2,
        requests_between_ramp: 2,
        ..Default::default()
    }
}

/// A data-plane request as the store saw it, with the status it answered.
#[derive(Debug, Clone)]
pub(crate) struct Logged {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub status: u16,
}

impl Logged {
    /// Inclusive byte range of a GET.
    pub fn range(&self) -> Option<(u64, u64)> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("range"))
            .and_then(|(_, v)| parse_range(v))
    }
}

#[derive(Default)]
struct State {
    objects: HashMap<String, Vec<u8>>,
    parts: BTreeMap<(String, u32), Bytes>,
    slot_requests: Vec<(String, UploadRequest)>,
    log: Vec<Logged>,
    put_failures: VecDeque<u16>,
    get_failures: VecDeque<u16>,
    rejected_parts: HashMap<u32, u16>,
    slot_content_length: Option<String>,
    grants_issued: u32,
    /// Grants with a lower generation are rejected with 403.
    valid_generation: u32,
    expire_after_gets: Option<usize>,
    successful_gets: usize,
    reject_all_grants: bool,
    truncate_by: usize,
}

/// Control plane and storage service in one object.
///
/// Upload slots point at `parts/{index}` of the object; PUT bodies are
/// checked against the MD5 announced for the slot. GETs are served from
/// seeded content or, failing that, from the uploaded parts in index order.
#[derive(Default)]
pub(crate) struct MockStore {
    state: Mutex<State>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_object(&self, object_id: &str, data: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(object_id.to_string(), data.to_vec());
    }

    /// Uploaded parts concatenated in index order.
    pub fn assembled(&self, object_id: &str) -> Vec<u8> {
        assembled(&self.state.lock().unwrap(), object_id)
    }

    pub fn slot_requests(&self) -> Vec<UploadRequest> {
        self.state
            .lock()
            .unwrap()
            .slot_requests
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<Logged> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn requests_with(&self, method: Method) -> Vec<Logged> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method)
            .collect()
    }

    /// Ranges of the GETs that succeeded.
    pub fn ranges(&self) -> Vec<(u64, u64)> {
        self.requests_with(Method::Get)
            .iter()
            .filter(|r| (200..300).contains(&r.status))
            .filter_map(Logged::range)
            .collect()
    }

    pub fn grants_issued(&self) -> u32 {
        self.state.lock().unwrap().grants_issued
    }

    /// The next requests of `method` are answered with these statuses, in order.
    pub fn fail_next(&self, method: Method, statuses: &[u16]) {
        let mut state = self.state.lock().unwrap();
        let queue = match method {
            Method::Put => &mut state.put_failures,
            _ => &mut state.get_failures,
        };
        queue.extend(statuses.iter().copied());
    }

    /// Every PUT of part `index` is answered with `status`.
    pub fn reject_part(&self, index: u32, status: u16) {
        self.state
            .lock()
            .unwrap()
            .rejected_parts
            .insert(index, status);
    }

    /// Slots carry this `content-length` instead of the requested size.
    pub fn override_slot_content_length(&self, value: &str) {
        self.state.lock().unwrap().slot_content_length = Some(value.to_string());
    }

    /// The grant in use expires after `n` successful GETs.
    pub fn expire_grant_after(&self, n: usize) {
        self.state.lock().unwrap().expire_after_gets = Some(n);
    }

    pub fn reject_all_grants(&self) {
        self.state.lock().unwrap().reject_all_grants = true;
    }

    /// Range responses come back `n` bytes short.
    pub fn truncate_ranges_by(&self, n: usize) {
        self.state.lock().unwrap().truncate_by = n;
    }

    fn handle(state: &mut State, request: &HttpRequest) -> HttpResponse {
        let failures = match request.method {
            Method::Put => &mut state.put_failures,
            _ => &mut state.get_failures,
        };
        if let Some(status) = failures.pop_front() {
            return HttpResponse::new(status);
        }

        let Some(path) = request.url.strip_prefix(BASE) else {
            return HttpResponse::new(404);
        };
        let segments: Vec<&str> = path.split('/').collect();

        match (request.method, segments.as_slice()) {
            (Method::Put, [object, "parts", index]) => {
                let object: &str = object;
                let Ok(index) = index.parse::<u32>() else {
                    return HttpResponse::new(400);
                };
                if let Some(&status) = state.rejected_parts.get(&index) {
                    return HttpResponse::new(status).with_body("part rejected");
                }
                let announced = state
                    .slot_requests
                    .iter()
                    .rev()
                    .find(|(o, r)| o == object && r.index == index)
                    .map(|(_, r)| r.md5.clone());
                let digest = md5_hex(&request.body);
                if announced.as_deref() != Some(digest.as_str()) {
                    return HttpResponse::new(400).with_body("BadDigest");
                }
                state
                    .parts
                    .insert((object.to_string(), index), request.body.clone());
                HttpResponse::new(200).with_header("etag", format!("\"{digest}\""))
            }
            (Method::Get, [object, "content"]) => {
                let object: &str = object;
                let generation = request
                    .header(GRANT_HEADER)
                    .and_then(|g| g.parse::<u32>().ok())
                    .unwrap_or(0);
                if state.reject_all_grants || generation < state.valid_generation {
                    return HttpResponse::new(403).with_body("grant expired");
                }
                let Some((start, end)) = request.header("range").and_then(parse_range) else {
                    return HttpResponse::new(400);
                };
                let content = match state.objects.get(object) {
                    Some(content) => content.clone(),
                    None => assembled(state, object),
                };
                if start as usize >= content.len() {
                    return HttpResponse::new(416);
                }
                let end = (end as usize).min(content.len() - 1);
                let keep = (end + 1 - start as usize).saturating_sub(state.truncate_by);
                let body = Bytes::copy_from_slice(&content[start as usize..start as usize + keep]);

                state.successful_gets += 1;
                if state.expire_after_gets == Some(state.successful_gets) {
                    state.expire_after_gets = None;
                    state.valid_generation = state.grants_issued;
                }
                HttpResponse::new(206).with_body(body)
            }
            _ => HttpResponse::new(404),
        }
    }
}

fn assembled(state: &State, object_id: &str) -> Vec<u8> {
    state
        .parts
        .iter()
        .filter(|((o, _), _)| o == object_id)
        .flat_map(|(_, part)| part.iter().copied())
        .collect()
}

fn parse_range(value: &str) -> Option<(u64, u64)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

impl HttpTransport for MockStore {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut state = self.state.lock().unwrap();
        let response = Self::handle(&mut state, &request);
        state.log.push(Logged {
            method: request.method,
            url: request.url,
            headers: request.headers,
            status: response.status,
        });
        Ok(response)
    }
}

impl ControlPlane for MockStore {
    async fn upload_slot(
        &self,
        target: &TransferTarget,
        request: &UploadRequest,
    ) -> Result<UploadSlot, TransferError> {
        let mut state = self.state.lock().unwrap();
        state
            .slot_requests
            .push((target.object_id.clone(), request.clone()));
        let content_length = state
            .slot_content_length
            .clone()
            .unwrap_or_else(|| request.size.to_string());
        Ok(UploadSlot {
            url: format!("{BASE}{}/parts/{}", target.object_id, request.index),
            headers: [
                ("content-length".to_string(), content_length),
                (
                    "content-type".to_string(),
                    "application/octet-stream".to_string(),
                ),
            ]
            .into(),
            part_index: request.index,
        })
    }

    async fn download_grant(
        &self,
        target: &TransferTarget,
        request: &DownloadRequest,
    ) -> Result<DownloadGrant, TransferError> {
        assert!(request.preauthenticated);
        let mut state = self.state.lock().unwrap();
        let generation = state.grants_issued;
        state.grants_issued += 1;
        Ok(DownloadGrant {
            url: format!("{BASE}{}/content", target.object_id),
            headers: [(GRANT_HEADER.to_string(), generation.to_string())].into(),
        })
    }

    /// Unknown objects describe as open and empty.
    async fn describe(&self, object_id: &str) -> Result<DescribeResponse, TransferError> {
        let state = self.state.lock().unwrap();
        let size = match state.objects.get(object_id) {
            Some(content) => content.len(),
            None => assembled(&state, object_id).len(),
        };
        Ok(DescribeResponse {
            id: object_id.to_string(),
            size: size as u64,
        })
    }
}
