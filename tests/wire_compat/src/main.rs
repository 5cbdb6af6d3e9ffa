fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use lading_protocol::{
        DescribeResponse, DownloadGrant, DownloadRequest, DownloadResponse, TransferTarget,
        UploadRequest, UploadResponse, UploadSlot,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  ours:    {reserialized}"
        );
        parsed
    }

    // --- Control-plane requests ---

    #[test]
    fn fixture_upload_request() {
        let req: UploadRequest = roundtrip_test("upload_request.json");
        assert_eq!(req.index, 1);
        assert_eq!(req.md5.len(), 32);
    }

    #[test]
    fn fixture_download_request() {
        let req: DownloadRequest = roundtrip_test("download_request.json");
        assert_eq!(req, DownloadRequest::default());
    }

    // --- Control-plane responses ---

    #[test]
    fn fixture_upload_response() {
        let resp: UploadResponse = roundtrip_test("upload_response.json");
        let slot = resp.into_slot(1);
        assert_eq!(slot.declared_content_length(), Some(Ok(16_777_216)));
        // content-length is never forwarded on the PUT.
        assert_eq!(slot.request_headers().len(), 2);
    }

    #[test]
    fn fixture_download_response() {
        let resp: DownloadResponse = roundtrip_test("download_response.json");
        let grant = DownloadGrant::from(resp);
        assert!(grant.url.starts_with("https://"));
    }

    #[test]
    fn fixture_describe_response() {
        let resp: DescribeResponse = roundtrip_test("describe_response.json");
        assert_eq!(resp.size, 50 * 1024 * 1024);
    }

    #[test]
    fn fixture_describe_response_with_extra_fields() {
        let fixture = load_fixture("describe_response_full.json");
        let resp: DescribeResponse = serde_json::from_value(fixture).unwrap();
        assert_eq!(resp.id, "file-B0b1x2");
        assert_eq!(resp.size, 52_428_800);
    }

    // --- Engine-side types ---

    #[test]
    fn fixture_transfer_target() {
        let target: TransferTarget = roundtrip_test("transfer_target.json");
        assert_eq!(target.object_id, "file-B0b1x2");
    }

    #[test]
    fn fixture_upload_slot() {
        let slot: UploadSlot = roundtrip_test("upload_slot.json");
        assert_eq!(slot.part_index, 3);
        assert!(slot.request_headers().is_empty());
    }

    #[test]
    fn fixture_download_grant() {
        let grant: DownloadGrant = roundtrip_test("download_grant.json");
        let headers = grant.range_headers(0, 65_535);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[1], ("Range".to_string(), "bytes=0-65535".to_string()));
    }
}
