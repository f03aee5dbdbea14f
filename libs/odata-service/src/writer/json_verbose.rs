//! JSON verbose: every payload wrapped in `{"d": ...}`.
//!
//! Version 1.0 writes feeds and link collections as bare arrays; 2.0 and
//! later wrap them in `{"results": [...]}` next to `__count` and `__next`.

use super::{WriteContext, bag_item_type, failure};
use crate::object_model::{
    ODataEntry, ODataExpanded, ODataFeed, ODataPayload, ODataProperty, ODataUrlCollection, ODataValue,
};
use odata_errors::ODataResult;
use odata_model::{PrimitiveValue, ProtocolVersion};
use serde_json::{Map, Number, Value, json};

/// # Errors
/// Never in practice; JSON values always serialize.
pub fn write(payload: &ODataPayload, ctx: &WriteContext<'_>) -> ODataResult<Vec<u8>> {
    let body = match payload {
        ODataPayload::Feed(feed) => feed_value(feed, ctx),
        ODataPayload::Entry(entry) => entry_value(entry, ctx),
        ODataPayload::Property(property) => {
            let mut object = Map::new();
            object.insert(property.name.clone(), property_value(property, ctx));
            Value::Object(object)
        }
        ODataPayload::Url(url) => json!({ "uri": ctx.absolute(&url.url) }),
        ODataPayload::Urls(urls) => links_value(urls, ctx),
        ODataPayload::ServiceDocument(doc) => json!({ "EntitySets": doc.collections }),
    };
    serde_json::to_vec(&json!({ "d": body })).map_err(failure)
}

fn wrapped(ctx: &WriteContext<'_>) -> bool {
    ctx.version >= ProtocolVersion::V2
}

fn feed_value(feed: &ODataFeed, ctx: &WriteContext<'_>) -> Value {
    let entries: Vec<Value> = feed.entries.iter().map(|e| entry_value(e, ctx)).collect();
    if !wrapped(ctx) {
        return Value::Array(entries);
    }
    let mut object = Map::new();
    if let Some(count) = feed.row_count {
        object.insert("__count".to_owned(), Value::String(count.to_string()));
    }
    object.insert("results".to_owned(), Value::Array(entries));
    if let Some(next) = &feed.next_link {
        object.insert("__next".to_owned(), Value::String(next.clone()));
    }
    Value::Object(object)
}

fn entry_value(entry: &ODataEntry, ctx: &WriteContext<'_>) -> Value {
    let mut metadata = Map::new();
    metadata.insert("uri".to_owned(), Value::String(entry.id.clone()));
    metadata.insert("type".to_owned(), Value::String(entry.type_name.clone()));
    if let Some(etag) = &entry.etag {
        metadata.insert("etag".to_owned(), Value::String(etag.clone()));
    }
    if let Some(media) = &entry.media_link {
        metadata.insert("edit_media".to_owned(), Value::String(ctx.absolute(&media.edit_link)));
        metadata.insert("media_src".to_owned(), Value::String(ctx.absolute(&media.src)));
        metadata.insert("content_type".to_owned(), Value::String(media.content_type.clone()));
    }

    let mut object = Map::new();
    object.insert("__metadata".to_owned(), Value::Object(metadata));
    for property in &entry.properties.properties {
        object.insert(property.name.clone(), property_value(property, ctx));
    }
    for link in &entry.links {
        let value = match &link.expanded {
            None => json!({ "__deferred": { "uri": ctx.absolute(&link.url) } }),
            Some(ODataExpanded::Entry(None)) => Value::Null,
            Some(ODataExpanded::Entry(Some(inner))) => entry_value(inner, ctx),
            Some(ODataExpanded::Feed(feed)) => feed_value(feed, ctx),
        };
        object.insert(link.name.clone(), value);
    }
    for stream in &entry.named_streams {
        object.insert(
            stream.name.clone(),
            json!({
                "__mediaresource": {
                    "edit_media": ctx.absolute(&stream.edit_link),
                    "media_src": ctx.absolute(&stream.src),
                    "content_type": stream.content_type,
                }
            }),
        );
    }
    Value::Object(object)
}

fn property_value(property: &ODataProperty, ctx: &WriteContext<'_>) -> Value {
    value(&property.type_name, &property.value, ctx)
}

fn value(type_name: &str, value: &ODataValue, ctx: &WriteContext<'_>) -> Value {
    match value {
        ODataValue::Null => Value::Null,
        ODataValue::Primitive(v) => primitive(v),
        ODataValue::Complex(content) => {
            let mut object = Map::new();
            object.insert("__metadata".to_owned(), json!({ "type": type_name }));
            for inner in &content.properties {
                object.insert(inner.name.clone(), property_value(inner, ctx));
            }
            Value::Object(object)
        }
        ODataValue::Bag(items) => {
            let item_type = bag_item_type(type_name);
            let items: Vec<Value> = items.iter().map(|item| self::value(item_type, item, ctx)).collect();
            if wrapped(ctx) {
                json!({ "__metadata": { "type": type_name }, "results": items })
            } else {
                Value::Array(items)
            }
        }
    }
}

fn links_value(urls: &ODataUrlCollection, ctx: &WriteContext<'_>) -> Value {
    let items: Vec<Value> = urls
        .urls
        .iter()
        .map(|u| json!({ "uri": ctx.absolute(&u.url) }))
        .collect();
    if !wrapped(ctx) {
        return Value::Array(items);
    }
    let mut object = Map::new();
    if let Some(count) = urls.count {
        object.insert("__count".to_owned(), Value::String(count.to_string()));
    }
    object.insert("results".to_owned(), Value::Array(items));
    if let Some(next) = &urls.next_link {
        object.insert("__next".to_owned(), Value::String(next.clone()));
    }
    Value::Object(object)
}

/// Verbose JSON form of a primitive: 64-bit integers and decimals as
/// strings, dates as `/Date(milliseconds)/`.
#[must_use]
pub fn primitive(value: &PrimitiveValue) -> Value {
    match value {
        PrimitiveValue::DateTime(dt) => Value::String(format!("/Date({})/", dt.and_utc().timestamp_millis())),
        other => common_primitive(other),
    }
}

/// JSON form shared by the verbose and light writers.
pub(crate) fn common_primitive(value: &PrimitiveValue) -> Value {
    match value {
        PrimitiveValue::Null => Value::Null,
        PrimitiveValue::Boolean(b) => Value::Bool(*b),
        PrimitiveValue::Byte(v) => Value::from(*v),
        PrimitiveValue::SByte(v) => Value::from(*v),
        PrimitiveValue::Int16(v) => Value::from(*v),
        PrimitiveValue::Int32(v) => Value::from(*v),
        PrimitiveValue::Double(d) => float(*d, value),
        PrimitiveValue::Single(s) => float(f64::from(*s), value),
        PrimitiveValue::Binary(_)
        | PrimitiveValue::DateTime(_)
        | PrimitiveValue::Decimal(_)
        | PrimitiveValue::Guid(_)
        | PrimitiveValue::Int64(_)
        | PrimitiveValue::String(_) => Value::String(value.to_text()),
    }
}

/// Non-finite floats have no JSON number form.
fn float(number: f64, value: &PrimitiveValue) -> Value {
    Number::from_f64(number).map_or_else(|| Value::String(value.to_text()), Value::Number)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::object_model::ObjectModelSerializer;
    use odata_model::EntityCollection;
    use odata_model::testing::{northwind_config, northwind_entities, northwind_model, northwind_wrapper};

    const ROOT: &str = "http://localhost/svc/";

    fn customers_feed(version: ProtocolVersion) -> Value {
        let wrapper = northwind_wrapper(northwind_config());
        let serializer = ObjectModelSerializer::new(&wrapper, ROOT);
        let set = wrapper.resolve_resource_set("Customers").unwrap();
        let mut rows = EntityCollection::new(northwind_entities(&northwind_model())["Customers"].clone());
        rows.count = Some(3);
        let feed = serializer.feed(&rows, &set, None, "Customers", None).unwrap();
        let bytes = write(&ODataPayload::Feed(feed), &WriteContext::new(ROOT, version)).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn version_one_feeds_are_arrays() {
        let doc = customers_feed(ProtocolVersion::V1);
        let rows = doc["d"].as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["__metadata"]["type"], "NorthWind.Customer");
        assert!(rows[0]["Orders"]["__deferred"]["uri"].as_str().unwrap().ends_with("/Orders"));
        assert_eq!(rows[0]["Address"]["__metadata"]["type"], "NorthWind.Address");
    }

    #[test]
    fn version_two_feeds_wrap_results() {
        let doc = customers_feed(ProtocolVersion::V2);
        assert_eq!(doc["d"]["__count"], "3");
        assert_eq!(doc["d"]["results"].as_array().unwrap().len(), 3);
        let first_key = doc["d"]["results"][0].as_object().unwrap().keys().next().unwrap().clone();
        assert_eq!(first_key, "__metadata");
    }

    #[test]
    fn primitives_use_verbose_encodings() {
        let date = odata_model::value::parse_datetime("1970-01-02T00:00:00").unwrap();
        assert_eq!(primitive(&PrimitiveValue::DateTime(date)), json!("/Date(86400000)/"));
        assert_eq!(primitive(&PrimitiveValue::Int64(7)), json!("7"));
        assert_eq!(primitive(&PrimitiveValue::Int32(7)), json!(7));
        assert_eq!(primitive(&PrimitiveValue::Double(f64::NAN)), json!("NaN"));
    }

    #[test]
    fn bags_are_wrapped_from_version_two() {
        let bag = ODataPayload::Property(ODataProperty {
            name: "Emails".to_owned(),
            type_name: "Bag(Edm.String)".to_owned(),
            value: ODataValue::Bag(vec![ODataValue::Primitive("a@b".into())]),
        });
        let bytes = write(&bag, &WriteContext::new(ROOT, ProtocolVersion::V3)).unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc["d"]["Emails"]["__metadata"]["type"], "Bag(Edm.String)");
        assert_eq!(doc["d"]["Emails"]["results"][0], "a@b");
    }
}
