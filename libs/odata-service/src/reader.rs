//! Request payload readers: Atom and JSON (verbose and light) entries into a
//! typed [`EntityInstance`].

use crate::format;
use chrono::DateTime;
use odata_errors::{ODataError, ODataResult, messages};
use odata_model::{
    ComplexInstance, EdmPrimitiveType, EntityInstance, MetadataProviderWrapper, PrimitiveValue,
    PropertyKind, PropertyValue, ResourceProperty, ResourceType,
};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde_json::{Map, Value};

const JSON_DATE_PREFIX: &str = "/Date(";

/// Reads entry payloads against the model.
pub struct EntryReader<'a> {
    wrapper: &'a MetadataProviderWrapper,
}

impl<'a> EntryReader<'a> {
    #[must_use]
    pub const fn new(wrapper: &'a MetadataProviderWrapper) -> Self {
        Self { wrapper }
    }

    /// Read one entry of type `ty` (or a type derived from it named by the payload).
    ///
    /// Navigation properties in the payload are ignored.
    ///
    /// # Errors
    /// `415` for content types other than Atom, XML or JSON; `400` when the
    /// payload is malformed, names unknown properties, or carries values of
    /// the wrong type.
    pub fn read(&self, body: &[u8], content_type: Option<&str>, ty: &ResourceType) -> ODataResult<EntityInstance> {
        let essence = content_type
            .and_then(|c| c.parse::<mime::Mime>().ok())
            .map(|m| m.essence_str().to_owned());
        let text = std::str::from_utf8(body).map_err(parse_error)?;
        match essence.as_deref() {
            Some(format::JSON) => {
                let value: Value = serde_json::from_str(text).map_err(parse_error)?;
                self.read_json_entry(&value, ty)
            }
            Some(format::ATOM | format::XML | "text/xml") | None => self.read_atom_entry(text, ty),
            Some(other) => Err(ODataError::unsupported_media_type(messages::unsupported_content_type(other))),
        }
    }

    /// Read a JSON entry, verbose (`{"d": {...}}`) or light (a bare object).
    ///
    /// # Errors
    /// See [`Self::read`].
    pub fn read_json_entry(&self, value: &Value, ty: &ResourceType) -> ODataResult<EntityInstance> {
        let object = match value {
            Value::Object(outer) => match outer.get("d") {
                Some(Value::Object(inner)) if outer.len() == 1 => inner,
                _ => outer,
            },
            _ => return Err(parse_error("an entry must be a JSON object")),
        };
        let ty = self.payload_type(json_type_name(object), ty)?;
        let mut entity = EntityInstance::new(ty.id());
        for (name, raw) in object {
            if is_annotation(name) || ty.named_streams().any(|stream| stream == name) {
                continue;
            }
            let property = ty
                .property(name)
                .ok_or_else(|| ODataError::bad_request(messages::unknown_payload_property(name, ty.full_name())))?;
            if property.is_navigation() {
                continue;
            }
            entity.set(name, self.json_value(property, raw)?);
        }
        Ok(entity)
    }

    fn payload_type<'t>(&'t self, named: Option<&str>, expected: &'t ResourceType) -> ODataResult<&'t ResourceType> {
        let Some(name) = named else {
            return Ok(expected);
        };
        self.wrapper
            .resolve_resource_type(name)
            .filter(|t| self.wrapper.is_assignable(expected.id(), t.id()))
            .ok_or_else(|| parse_error(format_args!("type '{name}' is not '{}'", expected.full_name())))
    }

    fn json_value(&self, property: &ResourceProperty, raw: &Value) -> ODataResult<PropertyValue> {
        let item_type = self.wrapper.resource_type(property.type_id())?;
        match property.kind() {
            PropertyKind::ComplexType => self.json_complex(item_type, raw),
            PropertyKind::PrimitiveBag | PropertyKind::ComplexBag => {
                let items = match raw {
                    Value::Array(items) => items,
                    Value::Object(o) => match o.get("results") {
                        Some(Value::Array(items)) => items,
                        _ => return Err(type_error(property.name(), item_type.full_name())),
                    },
                    Value::Null => return Ok(PropertyValue::Bag(Vec::new())),
                    _ => return Err(type_error(property.name(), item_type.full_name())),
                };
                let complex = property.kind() == PropertyKind::ComplexBag;
                items
                    .iter()
                    .map(|item| {
                        if complex {
                            self.json_complex(item_type, item)
                        } else {
                            json_primitive(property.name(), item_type, item).map(PropertyValue::Primitive)
                        }
                    })
                    .collect::<ODataResult<Vec<_>>>()
                    .map(PropertyValue::Bag)
            }
            _ => json_primitive(property.name(), item_type, raw).map(PropertyValue::Primitive),
        }
    }

    fn json_complex(&self, ty: &ResourceType, raw: &Value) -> ODataResult<PropertyValue> {
        let object = match raw {
            Value::Null => return Ok(PropertyValue::Complex(None)),
            Value::Object(o) => o,
            _ => return Err(type_error(ty.name(), ty.full_name())),
        };
        let mut complex = ComplexInstance::new(ty.id());
        for (name, value) in object {
            if is_annotation(name) {
                continue;
            }
            let property = ty
                .property(name)
                .ok_or_else(|| ODataError::bad_request(messages::unknown_payload_property(name, ty.full_name())))?;
            complex = complex.with(name, self.json_value(property, value)?);
        }
        Ok(PropertyValue::Complex(Some(complex)))
    }

    /// Read an Atom `<entry>`; for media link entries the properties sit
    /// outside `<content>`.
    ///
    /// # Errors
    /// See [`Self::read`].
    pub fn read_atom_entry(&self, text: &str, ty: &ResourceType) -> ODataResult<EntityInstance> {
        let root = parse_xml(text)?;
        if root.local_name() != "entry" {
            return Err(parse_error("the payload is not an Atom entry"));
        }
        let named = root
            .child("category")
            .and_then(|c| c.attribute("term"));
        let ty = self.payload_type(named, ty)?;
        let properties = root
            .child("content")
            .and_then(|c| c.child("properties"))
            .or_else(|| root.child("properties"));
        let mut entity = EntityInstance::new(ty.id());
        for element in properties.map(|p| p.children.as_slice()).unwrap_or_default() {
            let name = element.local_name();
            let property = ty
                .property(name)
                .ok_or_else(|| ODataError::bad_request(messages::unknown_payload_property(name, ty.full_name())))?;
            if property.is_navigation() {
                continue;
            }
            entity.set(name, self.xml_value(property, element)?);
        }
        Ok(entity)
    }

    fn xml_value(&self, property: &ResourceProperty, element: &XmlElement) -> ODataResult<PropertyValue> {
        let item_type = self.wrapper.resource_type(property.type_id())?;
        match property.kind() {
            PropertyKind::ComplexType => self.xml_complex(item_type, element),
            PropertyKind::PrimitiveBag => element
                .children
                .iter()
                .map(|item| xml_primitive(property.name(), item_type, item).map(PropertyValue::Primitive))
                .collect::<ODataResult<Vec<_>>>()
                .map(PropertyValue::Bag),
            PropertyKind::ComplexBag => element
                .children
                .iter()
                .map(|item| self.xml_complex(item_type, item))
                .collect::<ODataResult<Vec<_>>>()
                .map(PropertyValue::Bag),
            _ => xml_primitive(property.name(), item_type, element).map(PropertyValue::Primitive),
        }
    }

    fn xml_complex(&self, ty: &ResourceType, element: &XmlElement) -> ODataResult<PropertyValue> {
        if element.is_null() {
            return Ok(PropertyValue::Complex(None));
        }
        let mut complex = ComplexInstance::new(ty.id());
        for child in &element.children {
            let name = child.local_name();
            let property = ty
                .property(name)
                .ok_or_else(|| ODataError::bad_request(messages::unknown_payload_property(name, ty.full_name())))?;
            complex = complex.with(name, self.xml_value(property, child)?);
        }
        Ok(PropertyValue::Complex(Some(complex)))
    }
}

fn is_annotation(name: &str) -> bool {
    name.starts_with("__") || name.starts_with("odata.") || name.contains('@')
}

fn json_type_name(object: &Map<String, Value>) -> Option<&str> {
    object
        .get("odata.type")
        .and_then(Value::as_str)
        .or_else(|| {
            object
                .get("__metadata")
                .and_then(|m| m.get("type"))
                .and_then(Value::as_str)
        })
}

/// Typed primitive from a JSON value; numbers may arrive as strings.
///
/// # Errors
/// `400` when the value does not fit the property's kind.
pub fn json_primitive(name: &str, ty: &ResourceType, raw: &Value) -> ODataResult<PrimitiveValue> {
    let kind = ty
        .primitive_kind()
        .ok_or_else(|| type_error(name, ty.full_name()))?;
    let value = match raw {
        Value::Null => Some(PrimitiveValue::Null),
        Value::Bool(b) if kind == EdmPrimitiveType::Boolean => Some(PrimitiveValue::Boolean(*b)),
        Value::Number(n) if kind != EdmPrimitiveType::String => PrimitiveValue::from_text(kind, &n.to_string()),
        Value::String(s) if kind == EdmPrimitiveType::DateTime => {
            json_date(s).or_else(|| PrimitiveValue::from_text(kind, s))
        }
        Value::String(s) => PrimitiveValue::from_text(kind, s),
        _ => None,
    };
    value.ok_or_else(|| type_error(name, kind.name()))
}

/// `/Date(1299234030000)/`, with or without escaped slashes and an offset suffix.
fn json_date(text: &str) -> Option<PrimitiveValue> {
    let text = text.replace("\\/", "/");
    let inner = text.strip_prefix(JSON_DATE_PREFIX)?.strip_suffix(")/")?;
    let digits_end = inner
        .char_indices()
        .skip(1)
        .find(|(_, c)| *c == '+' || *c == '-')
        .map_or(inner.len(), |(i, _)| i);
    let millis: i64 = inner[..digits_end].parse().ok()?;
    DateTime::from_timestamp_millis(millis).map(|dt| PrimitiveValue::DateTime(dt.naive_utc()))
}

fn xml_primitive(name: &str, ty: &ResourceType, element: &XmlElement) -> ODataResult<PrimitiveValue> {
    let kind = ty
        .primitive_kind()
        .ok_or_else(|| type_error(name, ty.full_name()))?;
    if element.is_null() {
        return Ok(PrimitiveValue::Null);
    }
    PrimitiveValue::from_text(kind, &element.text).ok_or_else(|| type_error(name, kind.name()))
}

fn parse_error(detail: impl std::fmt::Display) -> ODataError {
    ODataError::bad_request(messages::payload_parse_error(detail))
}

fn type_error(name: &str, expected: &str) -> ODataError {
    parse_error(format_args!("the value of '{name}' is not a valid '{expected}'"))
}

/// A parsed XML element; names keep their prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    #[must_use]
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    /// Attribute by local name.
    #[must_use]
    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.rsplit(':').next() == Some(local))
            .map(|(_, v)| v.as_str())
    }

    /// First child by local name.
    #[must_use]
    pub fn child(&self, local: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.local_name() == local)
    }

    fn is_null(&self) -> bool {
        self.attribute("null") == Some("true")
    }
}

/// Parse a document into its root element.
///
/// # Errors
/// `400` on malformed XML or an empty document.
pub fn parse_xml(text: &str) -> ODataResult<XmlElement> {
    let mut reader = Reader::from_str(text);
    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root = None;
    loop {
        let event = reader.read_event_into(&mut buf).map_err(parse_error)?;
        match event {
            Event::Start(start) => stack.push(element_from(&start)?),
            Event::Empty(start) => {
                let element = element_from(&start)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| parse_error("unbalanced end tag"))?;
                attach(&mut stack, &mut root, element);
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text.unescape().map_err(parse_error)?);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    if !stack.is_empty() {
        return Err(parse_error("unexpected end of document"));
    }
    root.ok_or_else(|| parse_error("the document is empty"))
}

fn element_from(start: &quick_xml::events::BytesStart<'_>) -> ODataResult<XmlElement> {
    let mut element = XmlElement {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        ..XmlElement::default()
    };
    for attribute in start.attributes() {
        let attribute = attribute.map_err(parse_error)?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value().map_err(parse_error)?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use odata_model::testing::{northwind_config, northwind_wrapper};

    #[test]
    fn json_verbose_entry_with_typed_strings() {
        let wrapper = northwind_wrapper(northwind_config());
        let ty = wrapper.resolve_resource_type("NorthWind.Product").unwrap();
        let body = br#"{"d":{"__metadata":{"type":"NorthWind.Product"},"ProductID":3,"ProductName":"Aniseed","UnitPrice":"10.00","Discontinued":false,"RowVersion":"1"}}"#;
        let entity = EntryReader::new(&wrapper).read(body, Some("application/json;odata=verbose"), ty).unwrap();
        assert_eq!(entity.primitive("ProductID"), Some(&PrimitiveValue::Int32(3)));
        assert_eq!(entity.primitive("RowVersion"), Some(&PrimitiveValue::Int64(1)));
        assert_eq!(entity.primitive("UnitPrice").unwrap().to_text(), "10.00");
    }

    #[test]
    fn json_dates_accept_both_forms() {
        let wrapper = northwind_wrapper(northwind_config());
        let ty = wrapper.resolve_resource_type("NorthWind.Order").unwrap();
        let reader = EntryReader::new(&wrapper);
        let a = reader
            .read_json_entry(&serde_json::json!({"OrderID": 1, "OrderDate": "/Date(1299234030000)/"}), ty)
            .unwrap();
        let b = reader
            .read_json_entry(&serde_json::json!({"OrderID": 1, "OrderDate": "2011-03-04T10:20:30"}), ty)
            .unwrap();
        assert_eq!(a.primitive("OrderDate"), b.primitive("OrderDate"));
    }

    #[test]
    fn unknown_properties_and_bad_values_fail() {
        let wrapper = northwind_wrapper(northwind_config());
        let ty = wrapper.resolve_resource_type("NorthWind.Product").unwrap();
        let reader = EntryReader::new(&wrapper);
        let err = reader.read_json_entry(&serde_json::json!({"Nope": 1}), ty).unwrap_err();
        assert!(err.message().contains("'Nope'"));
        let err = reader.read_json_entry(&serde_json::json!({"ProductID": "x"}), ty).unwrap_err();
        assert!(err.message().contains("Edm.Int32"));
        let err = reader.read(b"a,b", Some("text/csv"), ty).unwrap_err();
        assert_eq!(err.status().as_u16(), 415);
    }

    #[test]
    fn named_stream_members_are_not_properties() {
        let wrapper = northwind_wrapper(northwind_config());
        let ty = wrapper.resolve_resource_type("NorthWind.Employee").unwrap();
        let reader = EntryReader::new(&wrapper);
        let entity = reader
            .read_json_entry(
                &serde_json::json!({"d": {
                    "EmployeeID": "EMP9",
                    "FirstName": "Ann",
                    "TumbNail_48X48": {"__mediaresource": {"edit_media": "Employees('EMP9')/TumbNail_48X48"}}
                }}),
                ty,
            )
            .unwrap();
        assert_eq!(entity.primitive("FirstName"), Some(&PrimitiveValue::String("Ann".to_owned())));
        assert!(entity.get("TumbNail_48X48").is_none());

        let err = reader.read_json_entry(&serde_json::json!({"Thumbnail": {}}), ty).unwrap_err();
        assert!(err.message().contains("'Thumbnail'"));
    }

    #[test]
    fn atom_entry_with_complex_and_null() {
        let wrapper = northwind_wrapper(northwind_config());
        let ty = wrapper.resolve_resource_type("NorthWind.Customer").unwrap();
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<entry xmlns="http://www.w3.org/2005/Atom" xmlns:d="http://schemas.microsoft.com/ado/2007/08/dataservices" xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata">
  <category term="NorthWind.Customer" scheme="http://schemas.microsoft.com/ado/2007/08/dataservices/scheme" />
  <content type="application/xml">
    <m:properties>
      <d:CustomerID>PERIC</d:CustomerID>
      <d:CustomerName>Pericles &amp; Co</d:CustomerName>
      <d:Rating m:type="Edm.Int32">2</d:Rating>
      <d:Photo m:type="Edm.Binary" m:null="true" />
      <d:Address m:type="NorthWind.Address"><d:City>Mexico</d:City></d:Address>
    </m:properties>
  </content>
</entry>"#;
        let entity = EntryReader::new(&wrapper).read(body.as_bytes(), Some(format::ATOM), ty).unwrap();
        assert_eq!(entity.primitive("CustomerName").and_then(|v| v.as_str()), Some("Pericles & Co"));
        assert_eq!(entity.primitive("Photo"), Some(&PrimitiveValue::Null));
        assert_eq!(entity.resolve_path(["Address", "City"]).and_then(|v| v.as_str()), Some("Mexico"));
    }

    #[test]
    fn malformed_xml_is_a_bad_request() {
        assert_eq!(parse_xml("<entry><a></entry>").unwrap_err().status().as_u16(), 400);
        assert!(parse_xml("").is_err());
    }
}
