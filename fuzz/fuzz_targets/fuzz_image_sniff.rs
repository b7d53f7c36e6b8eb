#![no_main]

use libfuzzer_sys::fuzz_target;

use sisyphe_media::media::{parse_manifest, ImageFormat};

fuzz_target!(|data: &[u8]| {
    if let Some(format) = ImageFormat::sniff(data) {
        // a sniffed format always maps back through its own MIME type
        assert_eq!(ImageFormat::from_mime(format.mime()), Some(format));
    }

    if let Ok(text) = std::str::from_utf8(data) {
        let _ = ImageFormat::from_mime(text);
        let _ = parse_manifest(text);
    }
});
