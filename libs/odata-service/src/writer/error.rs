//! OData error documents.
//!
//! JSON errors share one shape across verbose and light; everything else gets
//! the `<m:error>` XML document. The machine code is filled in only when the
//! service runs with verbose errors.

use super::METADATA_NS;
use super::xml::XmlWriter;
use crate::format::{JSON, ResponseFormat, XML};
use odata_errors::ODataError;
use serde_json::json;

const LANG: &str = "en-US";

/// Render `err` for a client that negotiated `format`.
///
/// Returns the content type and body. Rendering an error never fails; if the
/// XML sink somehow errors, the message goes out as plain text.
#[must_use]
pub fn write_error(err: &ODataError, format: Option<ResponseFormat>, verbose: bool) -> (String, Vec<u8>) {
    let code = if verbose { err.code() } else { "" };
    if format.is_some_and(ResponseFormat::is_json) {
        let body = json!({
            "error": {
                "code": code,
                "message": { "lang": LANG, "value": err.message() },
            }
        });
        return (format!("{JSON};charset=utf-8"), body.to_string().into_bytes());
    }
    match xml_error(code, err.message()) {
        Ok(body) => (format!("{XML};charset=utf-8"), body),
        Err(_) => (crate::format::TEXT.to_owned(), err.message().as_bytes().to_vec()),
    }
}

fn xml_error(code: &str, message: &str) -> odata_errors::ODataResult<Vec<u8>> {
    let mut w = XmlWriter::new()?;
    w.start("m:error", &[("xmlns:m", METADATA_NS)])?;
    w.text_element("m:code", &[], code)?;
    w.text_element("m:message", &[("xml:lang", LANG)], message)?;
    w.end("m:error")?;
    Ok(w.finish())
}
