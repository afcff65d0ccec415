// WhatsApp Gateway — QR Page Rendering
// artifact_image_src (checked data URL passthrough or SVG render),
// escape_attr, render_qr_page

use super::gateway::BootstrapView;
use crate::atoms::constants::{QR_MIN_DIMENSION, QR_PAGE_REFRESH_MS};
use crate::atoms::types::BootstrapArtifact;
use base64::Engine as _;
use log::warn;
use qrcode::render::svg;
use qrcode::QrCode;

pub const QR_NOT_AVAILABLE: &str = "QR Code is not available yet, please wait...";
pub const ALREADY_LOGGED_IN: &str = "Client is already logged in.";

/// Raster formats Evolution hands out as `data:image/<fmt>;base64,...`.
const DATA_URL_FORMATS: [&str; 4] = ["png", "jpeg", "gif", "webp"];

/// Image source for an `<img>` tag. Well-formed base64 image data URLs are
/// used as-is; raw QR payloads are rendered to SVG. `None` for any other
/// `data:` string or a payload too long for a QR code.
pub fn artifact_image_src(artifact: &BootstrapArtifact) -> Option<String> {
    if artifact.is_data_url() {
        if is_image_data_url(&artifact.encoded_image) {
            return Some(artifact.encoded_image.clone());
        }
        warn!("[qr] Rejecting malformed data URL ({} bytes)", artifact.encoded_image.len());
        return None;
    }
    let svg = render_svg(&artifact.encoded_image)?;
    Some(format!(
        "data:image/svg+xml;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(svg)
    ))
}

/// `data:image/{png|jpeg|gif|webp};base64,` followed by base64 only.
fn is_image_data_url(url: &str) -> bool {
    let Some(rest) = url.strip_prefix("data:image/") else {
        return false;
    };
    let Some((format, payload)) = rest.split_once(";base64,") else {
        return false;
    };
    DATA_URL_FORMATS.contains(&format)
        && !payload.is_empty()
        && payload
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
}

fn render_svg(data: &str) -> Option<String> {
    let code = match QrCode::new(data.as_bytes()) {
        Ok(code) => code,
        Err(e) => {
            warn!("[qr] Cannot encode {}-byte payload: {}", data.len(), e);
            return None;
        }
    };
    Some(
        code.render::<svg::Color>()
            .min_dimensions(QR_MIN_DIMENSION, QR_MIN_DIMENSION)
            .dark_color(svg::Color("#000000"))
            .light_color(svg::Color("#ffffff"))
            .build(),
    )
}

/// Escape for a double-quoted HTML attribute.
fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Body for `GET /qr`: the scan page, or one of the two plain-text notices.
pub fn render_qr_page(view: &BootstrapView) -> String {
    let artifact = match view {
        BootstrapView::NotYetAvailable => return QR_NOT_AVAILABLE.to_string(),
        BootstrapView::AlreadyAuthenticated => return ALREADY_LOGGED_IN.to_string(),
        BootstrapView::Available(artifact) => artifact,
    };
    let Some(src) = artifact_image_src(artifact) else {
        return QR_NOT_AVAILABLE.to_string();
    };
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>WhatsApp Login</title></head>
<body>
    <h1>Scan the QR Code to Log in</h1>
    <img src="{src}" width="{dim}" height="{dim}" alt="WhatsApp QR code" />
    <p>Once scanned, you will be logged in.</p>
    <p><small>Issued at {issued}</small></p>
    <script>
        setTimeout(function() {{ window.location.reload(); }}, {refresh});
    </script>
</body>
</html>"#,
        src = escape_attr(&src),
        dim = QR_MIN_DIMENSION,
        issued = artifact.issued_at.format("%H:%M:%S UTC"),
        refresh = QR_PAGE_REFRESH_MS
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_urls_pass_through() {
        let artifact = BootstrapArtifact::new("data:image/png;base64,AAAA");
        assert_eq!(artifact_image_src(&artifact).unwrap(), "data:image/png;base64,AAAA");
    }

    #[test]
    fn raw_codes_render_as_svg() {
        let artifact = BootstrapArtifact::new("2@Xy9kQ,abc,def,ghi");
        let src = artifact_image_src(&artifact).unwrap();
        let encoded = src.strip_prefix("data:image/svg+xml;base64,").unwrap();
        let svg = String::from_utf8(base64::engine::general_purpose::STANDARD.decode(encoded).unwrap()).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("#000000"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn malformed_data_urls_rejected() {
        for bad in [
            "data:x\" onerror=\"alert(1)",
            "data:text/html;base64,PHNjcmlwdD4=",
            "data:image/svg+xml;base64,PHN2Zz4=",
            "data:image/png;base64,AA\"<>",
            "data:image/png;base64,",
            "data:image/png,AAAA",
        ] {
            assert!(artifact_image_src(&BootstrapArtifact::new(bad)).is_none(), "accepted {}", bad);
        }
    }

    #[test]
    fn injected_artifact_never_reaches_markup() {
        let view = BootstrapView::Available(BootstrapArtifact::new("data:x\" onerror=\"alert(1)"));
        let page = render_qr_page(&view);
        assert_eq!(page, QR_NOT_AVAILABLE);
        assert!(!page.contains("onerror"));
    }

    #[test]
    fn attribute_escaping() {
        assert_eq!(escape_attr(r#"a"b<c>&'d"#), "a&quot;b&lt;c&gt;&amp;&#39;d");
        assert_eq!(escape_attr("data:image/png;base64,AA=="), "data:image/png;base64,AA==");
    }

    #[test]
    fn page_variants() {
        assert_eq!(render_qr_page(&BootstrapView::NotYetAvailable), QR_NOT_AVAILABLE);
        assert_eq!(render_qr_page(&BootstrapView::AlreadyAuthenticated), ALREADY_LOGGED_IN);

        let page = render_qr_page(&BootstrapView::Available(BootstrapArtifact::new("data:image/png;base64,QQ")));
        assert!(page.contains(r#"<img src="data:image/png;base64,QQ""#));
        assert!(page.contains("window.location.reload()"));
        assert!(page.contains("5000"));
    }
}
