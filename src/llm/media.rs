use base64::{engine::general_purpose, Engine as _};

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub fn normalize_image_mime_type(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" => "image/jpeg".to_string(),
        "" => "image/png".to_string(),
        _ => lowered,
    }
}

/// Builds a data URL for base64 `payload`, sniffing the MIME type from the
/// decoded bytes when the provider did not give one.
pub fn data_url_from_base64(mime_type: Option<&str>, payload: &str) -> Option<String> {
    let payload = payload.trim();
    if payload.is_empty() {
        return None;
    }
    let mime_type = match mime_type.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => normalize_image_mime_type(value),
        None => general_purpose::STANDARD
            .decode(payload)
            .ok()
            .and_then(|bytes| detect_mime_type(&bytes))
            .unwrap_or_else(|| "image/png".to_string()),
    };
    Some(format!("data:{};base64,{}", mime_type, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_1X1: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    #[test]
    fn sniffs_png_when_mime_is_missing() {
        let url = data_url_from_base64(None, PNG_1X1).unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn provider_mime_is_normalised() {
        let url = data_url_from_base64(Some("IMAGE/JPG"), "AAAA").unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));
        assert!(data_url_from_base64(Some("image/png"), "   ").is_none());
    }
}
