//! Header rules for both directions of a fetch.

use axum::http::{
    HeaderMap, HeaderName, HeaderValue,
    header::{
        ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_ENCODING,
        CONTENT_LENGTH, CONTENT_TYPE, PRAGMA, USER_AGENT,
    },
};

use crate::{
    error::{GatewayError, Result},
    request::FetchRequest,
};

/// Headers that only make sense for a single transport leg.
pub const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Caller headers that may be copied upstream via `forward_headers`.
pub const FORWARDABLE: &[&str] = &[
    "if-none-match",
    "if-modified-since",
    "if-match",
    "if-unmodified-since",
    "if-range",
    "range",
    "authorization",
    "cookie",
];

/// Upstream headers relayed to the caller.
pub const RESPONSE_ALLOWLIST: &[&str] = &[
    "content-type",
    "content-length",
    "etag",
    "last-modified",
    "cache-control",
    "expires",
    "date",
    "server",
    "content-disposition",
    "accept-ranges",
    "content-encoding",
    "vary",
];

pub const DEFAULT_ACCEPT: &str = "*/*";

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Copy the named caller headers that are on the [`FORWARDABLE`] list.
pub fn forwarded_headers<'a>(names: impl IntoIterator<Item = &'a str>, inbound: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for name in names {
        let name = name.trim().to_ascii_lowercase();
        if !FORWARDABLE.contains(&name.as_str()) {
            continue;
        }
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        if out.contains_key(&name) {
            continue;
        }
        for value in inbound.get_all(&name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// User agent sent upstream: the profile template, optionally wrapped as
/// `"<custom> (<template>)"`.
pub fn user_agent(request: &FetchRequest, custom: Option<&str>) -> String {
    let template = request.ua().template();
    match custom {
        Some(custom) => format!("{custom} ({template})"),
        None => template.to_string(),
    }
}

/// Full outbound header set for a request.
pub fn outbound_headers(
    request: &FetchRequest,
    custom_user_agent: Option<&str>,
    default_language: &str,
) -> Result<HeaderMap> {
    let value = |name: &str, v: &str| {
        HeaderValue::from_str(v)
            .map_err(|_| GatewayError::invalid_request(format!("{name} is not a valid header value")))
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        value("user agent", &user_agent(request, custom_user_agent))?,
    );
    headers.insert(
        ACCEPT,
        value("accept", request.accept().unwrap_or(DEFAULT_ACCEPT))?,
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        value("lang", request.language().unwrap_or(default_language))?,
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

    for (name, v) in request.forwarded_headers() {
        if !is_hop_by_hop(name) {
            headers.insert(name.clone(), v.clone());
        }
    }
    Ok(headers)
}

/// Project upstream headers onto the response allowlist and synthesize a
/// download filename for PDFs and images.
pub fn sanitize_response_headers(upstream: &HeaderMap, request_path: &str) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in upstream {
        if is_hop_by_hop(name) || !RESPONSE_ALLOWLIST.contains(&name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    // Bodies are relayed decoded and re-framed.
    out.remove(CONTENT_ENCODING);
    out.remove(CONTENT_LENGTH);

    let content_type = out
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if (content_type.contains("pdf") || content_type.starts_with("image/"))
        && !out.contains_key(CONTENT_DISPOSITION)
    {
        let disposition = format!("attachment; filename=\"{}\"", filename_from_path(request_path));
        if let Ok(v) = HeaderValue::from_str(&disposition) {
            out.insert(CONTENT_DISPOSITION, v);
        }
    }
    out
}

/// Last path segment, or `download` when the path is empty or a directory.
pub fn filename_from_path(path: &str) -> String {
    if path.is_empty() || path.ends_with('/') {
        return "download".to_string();
    }
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("download")
        .to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {
        super::*,
        crate::request::{FetchParams, RequestDefaults, UaProfile},
        axum::http::header::{ETAG, SERVER, SET_COOKIE, TRANSFER_ENCODING},
        bytes::Bytes,
        rstest::rstest,
    };

    #[rstest]
    #[case("/path/to/file.pdf", "file.pdf")]
    #[case("/", "download")]
    #[case("", "download")]
    #[case("/path/", "download")]
    #[case("report.pdf", "report.pdf")]
    #[case("/a//b.png", "b.png")]
    fn filename_derivation(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(filename_from_path(path), expected);
    }

    #[test]
    fn sanitize_keeps_allowlist_only() {
        let mut upstream = HeaderMap::new();
        upstream.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        upstream.insert(CONTENT_LENGTH, HeaderValue::from_static("42"));
        upstream.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        upstream.insert(ETAG, HeaderValue::from_static("\"v1\""));
        upstream.insert(SERVER, HeaderValue::from_static("nginx"));
        upstream.insert(SET_COOKIE, HeaderValue::from_static("a=b"));
        upstream.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        upstream.insert("x-powered-by", HeaderValue::from_static("php"));

        let out = sanitize_response_headers(&upstream, "/index.html");
        assert_eq!(out.get(CONTENT_TYPE).unwrap(), "text/html");
        assert_eq!(out.get(ETAG).unwrap(), "\"v1\"");
        assert_eq!(out.get(SERVER).unwrap(), "nginx");
        assert!(out.get(CONTENT_LENGTH).is_none());
        assert!(out.get(CONTENT_ENCODING).is_none());
        assert!(out.get(SET_COOKIE).is_none());
        assert!(out.get(TRANSFER_ENCODING).is_none());
        assert!(out.get("x-powered-by").is_none());
        assert!(out.get(CONTENT_DISPOSITION).is_none());
    }

    #[rstest]
    #[case("application/pdf", "/docs/report.pdf", "attachment; filename=\"report.pdf\"")]
    #[case("image/png", "/img/", "attachment; filename=\"download\"")]
    #[case("IMAGE/JPEG", "/a/photo.jpg", "attachment; filename=\"photo.jpg\"")]
    fn sanitize_synthesizes_disposition(
        #[case] content_type: &'static str,
        #[case] path: &str,
        #[case] expected: &str,
    ) {
        let mut upstream = HeaderMap::new();
        upstream.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        let out = sanitize_response_headers(&upstream, path);
        assert_eq!(out.get(CONTENT_DISPOSITION).unwrap(), expected);
    }

    #[test]
    fn sanitize_keeps_upstream_disposition() {
        let mut upstream = HeaderMap::new();
        upstream.insert(CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
        upstream.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("inline; filename=\"x.pdf\""),
        );
        let out = sanitize_response_headers(&upstream, "/y.pdf");
        assert_eq!(
            out.get(CONTENT_DISPOSITION).unwrap(),
            "inline; filename=\"x.pdf\""
        );
    }

    fn request(ua: UaProfile, accept: Option<&str>, lang: Option<&str>) -> FetchRequest {
        FetchParams {
            url: "https://example.com".into(),
            ua,
            accept: accept.map(str::to_string),
            lang: lang.map(str::to_string),
            ..FetchParams::default()
        }
        .into_request(&RequestDefaults::default(), &HeaderMap::new(), Bytes::new())
        .unwrap()
    }

    #[test]
    fn outbound_defaults() {
        let req = request(UaProfile::Desktop, None, None);
        let headers = outbound_headers(&req, None, "es-ES,es;q=0.9,en;q=0.8").unwrap();
        assert_eq!(headers.get(USER_AGENT).unwrap(), crate::request::DESKTOP_UA);
        assert_eq!(headers.get(ACCEPT).unwrap(), "*/*");
        assert_eq!(
            headers.get(ACCEPT_LANGUAGE).unwrap(),
            "es-ES,es;q=0.9,en;q=0.8"
        );
        assert_eq!(headers.get(CACHE_CONTROL).unwrap(), "no-cache");
        assert_eq!(headers.get(PRAGMA).unwrap(), "no-cache");
    }

    #[test]
    fn outbound_custom_user_agent_wraps_template() {
        let req = request(UaProfile::Mobile, Some("text/html"), Some("en-US"));
        let headers = outbound_headers(&req, Some("MyBot/2.0"), "es-ES").unwrap();
        let ua = headers.get(USER_AGENT).unwrap().to_str().unwrap();
        assert_eq!(ua, format!("MyBot/2.0 ({})", crate::request::MOBILE_UA));
        assert_eq!(headers.get(ACCEPT).unwrap(), "text/html");
        assert_eq!(headers.get(ACCEPT_LANGUAGE).unwrap(), "en-US");
    }

    #[test]
    fn forwarded_headers_ignore_hop_by_hop() {
        let mut inbound = HeaderMap::new();
        inbound.insert("te", HeaderValue::from_static("trailers"));
        inbound.insert("range", HeaderValue::from_static("bytes=0-10"));
        let out = forwarded_headers(["TE", "Range", "range"], &inbound);
        assert_eq!(out.len(), 1);
        assert_eq!(out.get("range").unwrap(), "bytes=0-10");
    }
}
