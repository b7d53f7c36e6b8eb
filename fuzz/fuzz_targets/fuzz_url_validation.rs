#![no_main]

use libfuzzer_sys::fuzz_target;

use sisyphe_media::media::{canonical_video_url, validate_url, HostPolicy};

fuzz_target!(|data: &str| {
    // Must never panic regardless of input.
    let open = HostPolicy::default();
    let _ = validate_url(data, &open);

    let restricted = HostPolicy {
        allowed: Some(vec!["imgur.com".to_string(), ".pinimg.com".to_string()]),
        allow_private: true,
    };
    if let Ok(url) = validate_url(data, &restricted) {
        assert!(matches!(url.scheme(), "http" | "https"));
    }

    let _ = canonical_video_url(data);
});
