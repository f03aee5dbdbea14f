//! XML plumbing shared by the Atom and CSDL writers, and the plain XML
//! property and links documents.

use super::{DATA_NS, METADATA_NS, WriteContext, bag_item_type, failure};
use crate::object_model::{ODataPayload, ODataProperty, ODataUrlCollection, ODataValue};
use odata_errors::ODataResult;
use odata_model::EdmPrimitiveType;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

/// Indented XML output with an XML declaration.
pub struct XmlWriter {
    inner: Writer<Vec<u8>>,
}

impl XmlWriter {
    /// # Errors
    /// Never in practice; the sink is in memory.
    pub fn new() -> ODataResult<Self> {
        let mut inner = Writer::new_with_indent(Vec::new(), b' ', 2);
        inner
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), Some("yes"))))
            .map_err(failure)?;
        Ok(Self { inner })
    }

    /// # Errors
    /// Never in practice; the sink is in memory.
    pub fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> ODataResult<()> {
        self.inner
            .write_event(Event::Start(element(name, attributes)))
            .map_err(failure)
    }

    /// # Errors
    /// Never in practice; the sink is in memory.
    pub fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> ODataResult<()> {
        self.inner
            .write_event(Event::Empty(element(name, attributes)))
            .map_err(failure)
    }

    /// # Errors
    /// Never in practice; the sink is in memory.
    pub fn end(&mut self, name: &str) -> ODataResult<()> {
        self.inner
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(failure)
    }

    /// `<name>text</name>`, or `<name />` for empty text.
    ///
    /// # Errors
    /// Never in practice; the sink is in memory.
    pub fn text_element(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) -> ODataResult<()> {
        if text.is_empty() {
            return self.empty(name, attributes);
        }
        self.start(name, attributes)?;
        self.inner
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(failure)?;
        self.end(name)
    }

    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.inner.into_inner()
    }
}

fn element<'n>(name: &'n str, attributes: &[(&str, &str)]) -> BytesStart<'n> {
    let mut start = BytesStart::new(name);
    for &(key, value) in attributes {
        start.push_attribute((key, value));
    }
    start
}

/// Write `property` as a `d:` element; `extra` lands on the outer element.
///
/// # Errors
/// Never in practice; the sink is in memory.
pub fn write_property(w: &mut XmlWriter, property: &ODataProperty, extra: &[(&str, &str)]) -> ODataResult<()> {
    let name = format!("d:{}", property.name);
    let typed = property.primitive_kind() != Some(EdmPrimitiveType::String);
    write_value(w, &name, typed.then_some(property.type_name.as_str()), &property.value, extra)
}

fn write_value(
    w: &mut XmlWriter,
    name: &str,
    type_name: Option<&str>,
    value: &ODataValue,
    extra: &[(&str, &str)],
) -> ODataResult<()> {
    let mut attributes = extra.to_vec();
    if let Some(type_name) = type_name {
        attributes.push(("m:type", type_name));
    }
    match value {
        ODataValue::Null => {
            attributes.push(("m:null", "true"));
            w.empty(name, &attributes)
        }
        ODataValue::Primitive(v) => w.text_element(name, &attributes, &v.to_text()),
        ODataValue::Complex(content) => {
            w.start(name, &attributes)?;
            for inner in &content.properties {
                write_property(w, inner, &[])?;
            }
            w.end(name)
        }
        ODataValue::Bag(items) => {
            w.start(name, &attributes)?;
            let item_type = type_name.map(bag_item_type);
            // Complex items carry their type; primitive items inherit it from the bag.
            let item_is_complex = items.iter().any(|i| matches!(i, ODataValue::Complex(_)));
            for item in items {
                let item_type = item_type.filter(|_| item_is_complex);
                write_value(w, "d:element", item_type, item, &[])?;
            }
            w.end(name)
        }
    }
}

/// Plain XML for a property or for `$links` results.
///
/// # Errors
/// `500` for payloads plain XML does not carry.
pub fn write(payload: &ODataPayload, ctx: &WriteContext<'_>) -> ODataResult<Vec<u8>> {
    let mut w = XmlWriter::new()?;
    match payload {
        ODataPayload::Property(property) => {
            write_property(&mut w, property, &[("xmlns:d", DATA_NS), ("xmlns:m", METADATA_NS)])?;
        }
        ODataPayload::Url(url) => w.text_element("uri", &[("xmlns", DATA_NS)], &ctx.absolute(&url.url))?,
        ODataPayload::Urls(urls) => write_links(&mut w, urls, ctx)?,
        ODataPayload::Feed(_) | ODataPayload::Entry(_) | ODataPayload::ServiceDocument(_) => {
            return Err(failure("feeds, entries and service documents are written as Atom"));
        }
    }
    Ok(w.finish())
}

fn write_links(w: &mut XmlWriter, urls: &ODataUrlCollection, ctx: &WriteContext<'_>) -> ODataResult<()> {
    w.start("links", &[("xmlns", DATA_NS), ("xmlns:m", METADATA_NS)])?;
    if let Some(count) = urls.count {
        w.text_element("m:count", &[], &count.to_string())?;
    }
    for url in &urls.urls {
        w.text_element("uri", &[], &ctx.absolute(&url.url))?;
    }
    if let Some(next) = &urls.next_link {
        w.text_element("next", &[], next)?;
    }
    w.end("links")
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::object_model::{ODataPropertyContent, ODataUrl};
    use odata_model::{PrimitiveValue, ProtocolVersion};

    const ROOT: &str = "http://localhost/svc/";

    fn text(payload: &ODataPayload) -> String {
        String::from_utf8(write(payload, &WriteContext::new(ROOT, ProtocolVersion::V1)).unwrap()).unwrap()
    }

    #[test]
    fn primitive_property_is_typed_unless_string() {
        let rating = ODataPayload::Property(ODataProperty {
            name: "Rating".to_owned(),
            type_name: "Edm.Int32".to_owned(),
            value: ODataValue::Primitive(PrimitiveValue::Int32(4)),
        });
        let out = text(&rating);
        assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\" standalone=\"yes\"?>"));
        assert!(out.contains("m:type=\"Edm.Int32\">4</d:Rating>"));

        let name = ODataPayload::Property(ODataProperty {
            name: "CustomerName".to_owned(),
            type_name: "Edm.String".to_owned(),
            value: ODataValue::Primitive(PrimitiveValue::String("A & B".to_owned())),
        });
        let out = text(&name);
        assert!(!out.contains("m:type"));
        assert!(out.contains(">A &amp; B</d:CustomerName>"));
    }

    #[test]
    fn complex_and_null_values() {
        let address = ODataPayload::Property(ODataProperty {
            name: "Address".to_owned(),
            type_name: "NorthWind.Address".to_owned(),
            value: ODataValue::Complex(ODataPropertyContent {
                properties: vec![ODataProperty {
                    name: "City".to_owned(),
                    type_name: "Edm.String".to_owned(),
                    value: ODataValue::Null,
                }],
            }),
        });
        let out = text(&address);
        assert!(out.contains("<d:City m:null=\"true\"/>"));
        assert!(out.contains("</d:Address>"));
    }

    #[test]
    fn links_list_absolute_uris() {
        let links = ODataPayload::Urls(ODataUrlCollection {
            urls: vec![ODataUrl {
                url: "Orders(10643)".to_owned(),
            }],
            count: Some(2),
            next_link: None,
        });
        let out = text(&links);
        assert!(out.contains("<m:count>2</m:count>"));
        assert!(out.contains("<uri>http://localhost/svc/Orders(10643)</uri>"));
    }
}
