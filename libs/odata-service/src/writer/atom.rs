//! Atom feeds, entries and service documents.

use super::xml::{XmlWriter, write_property};
use super::{
    APP_NS, ATOM_NS, DATA_NS, EDIT_MEDIA_REL, MEDIARESOURCE_REL, METADATA_NS, RELATED_REL, SCHEME,
    WriteContext, failure,
};
use crate::format::{ATOM, XML};
use crate::object_model::{ODataEntry, ODataExpanded, ODataFeed, ODataLink, ODataPayload, ServiceDocument};
use odata_errors::ODataResult;

/// # Errors
/// `500` for payloads Atom does not carry.
pub fn write(payload: &ODataPayload, ctx: &WriteContext<'_>) -> ODataResult<Vec<u8>> {
    let mut w = XmlWriter::new()?;
    let updated = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let mut atom = AtomWriter {
        w: &mut w,
        ctx,
        updated: &updated,
    };
    match payload {
        ODataPayload::Feed(feed) => atom.feed(feed, true)?,
        ODataPayload::Entry(entry) => atom.entry(entry, true)?,
        ODataPayload::ServiceDocument(doc) => atom.service_document(doc)?,
        ODataPayload::Property(_) | ODataPayload::Url(_) | ODataPayload::Urls(_) => {
            return Err(failure("properties and links are written as plain XML"));
        }
    }
    Ok(w.finish())
}

struct AtomWriter<'w, 'c> {
    w: &'w mut XmlWriter,
    ctx: &'c WriteContext<'c>,
    updated: &'c str,
}

fn root_attributes(service_root: &str) -> Vec<(&str, &str)> {
    vec![
        ("xml:base", service_root),
        ("xmlns:d", DATA_NS),
        ("xmlns:m", METADATA_NS),
        ("xmlns", ATOM_NS),
    ]
}

impl AtomWriter<'_, '_> {
    fn feed(&mut self, feed: &ODataFeed, top_level: bool) -> ODataResult<()> {
        let attributes = if top_level { root_attributes(self.ctx.service_root) } else { Vec::new() };
        self.w.start("feed", &attributes)?;
        self.w.text_element("title", &[("type", "text")], &feed.title)?;
        self.w.text_element("id", &[], &feed.id)?;
        self.w.text_element("updated", &[], self.updated)?;
        self.w
            .empty("link", &[("rel", "self"), ("title", feed.title.as_str()), ("href", feed.self_link.as_str())])?;
        if let Some(count) = feed.row_count {
            self.w.text_element("m:count", &[], &count.to_string())?;
        }
        for entry in &feed.entries {
            self.entry(entry, false)?;
        }
        if let Some(next) = &feed.next_link {
            self.w.empty("link", &[("rel", "next"), ("href", next.as_str())])?;
        }
        self.w.end("feed")
    }

    fn entry(&mut self, entry: &ODataEntry, top_level: bool) -> ODataResult<()> {
        let mut attributes = if top_level { root_attributes(self.ctx.service_root) } else { Vec::new() };
        if let Some(etag) = &entry.etag {
            attributes.push(("m:etag", etag.as_str()));
        }
        self.w.start("entry", &attributes)?;
        self.w.text_element("id", &[], &entry.id)?;
        self.w.empty("title", &[("type", "text")])?;
        self.w.text_element("updated", &[], self.updated)?;
        self.w.start("author", &[])?;
        self.w.empty("name", &[])?;
        self.w.end("author")?;

        let title = entry.type_name.rsplit('.').next().unwrap_or(&entry.type_name);
        self.w
            .empty("link", &[("rel", "edit"), ("title", title), ("href", entry.edit_link.as_str())])?;
        if let Some(media) = &entry.media_link {
            self.w.empty("link", &[("rel", "edit-media"), ("title", title), ("href", media.edit_link.as_str())])?;
        }
        for link in &entry.links {
            self.link(link)?;
        }
        for stream in &entry.named_streams {
            let edit_rel = format!("{EDIT_MEDIA_REL}{}", stream.name);
            let read_rel = format!("{MEDIARESOURCE_REL}{}", stream.name);
            self.w.empty(
                "link",
                &[
                    ("rel", edit_rel.as_str()),
                    ("type", stream.content_type.as_str()),
                    ("title", stream.name.as_str()),
                    ("href", stream.edit_link.as_str()),
                ],
            )?;
            self.w.empty(
                "link",
                &[
                    ("rel", read_rel.as_str()),
                    ("type", stream.content_type.as_str()),
                    ("title", stream.name.as_str()),
                    ("href", stream.src.as_str()),
                ],
            )?;
        }
        self.w
            .empty("category", &[("term", entry.type_name.as_str()), ("scheme", SCHEME)])?;

        // A media link entry points at its stream; its properties sit outside <content>.
        if let Some(media) = &entry.media_link {
            self.w
                .empty("content", &[("type", media.content_type.as_str()), ("src", media.src.as_str())])?;
            self.properties(entry)?;
        } else {
            self.w.start("content", &[("type", XML)])?;
            self.properties(entry)?;
            self.w.end("content")?;
        }
        self.w.end("entry")
    }

    fn properties(&mut self, entry: &ODataEntry) -> ODataResult<()> {
        if entry.properties.properties.is_empty() {
            return self.w.empty("m:properties", &[]);
        }
        self.w.start("m:properties", &[])?;
        for property in &entry.properties.properties {
            write_property(self.w, property, &[])?;
        }
        self.w.end("m:properties")
    }

    fn link(&mut self, link: &ODataLink) -> ODataResult<()> {
        let rel = format!("{RELATED_REL}{}", link.name);
        let kind = if link.is_collection {
            format!("{ATOM};type=feed")
        } else {
            format!("{ATOM};type=entry")
        };
        let attributes = [
            ("rel", rel.as_str()),
            ("type", kind.as_str()),
            ("title", link.name.as_str()),
            ("href", link.url.as_str()),
        ];
        let Some(expanded) = &link.expanded else {
            return self.w.empty("link", &attributes);
        };
        self.w.start("link", &attributes)?;
        match expanded {
            ODataExpanded::Entry(None) => self.w.empty("m:inline", &[])?,
            ODataExpanded::Entry(Some(entry)) => {
                self.w.start("m:inline", &[])?;
                self.entry(entry, false)?;
                self.w.end("m:inline")?;
            }
            ODataExpanded::Feed(feed) => {
                self.w.start("m:inline", &[])?;
                self.feed(feed, false)?;
                self.w.end("m:inline")?;
            }
        }
        self.w.end("link")
    }

    fn service_document(&mut self, doc: &ServiceDocument) -> ODataResult<()> {
        self.w.start(
            "service",
            &[
                ("xml:base", self.ctx.service_root),
                ("xmlns:atom", ATOM_NS),
                ("xmlns:app", APP_NS),
                ("xmlns", APP_NS),
            ],
        )?;
        self.w.start("workspace", &[])?;
        self.w.text_element("atom:title", &[], "Default")?;
        for collection in &doc.collections {
            self.w.start("collection", &[("href", collection.as_str())])?;
            self.w.text_element("atom:title", &[], collection)?;
            self.w.end("collection")?;
        }
        self.w.end("workspace")?;
        self.w.end("service")
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::object_model::ObjectModelSerializer;
    use odata_model::testing::{northwind_config, northwind_entities, northwind_model, northwind_wrapper};
    use odata_model::{EntityCollection, ProtocolVersion};

    const ROOT: &str = "http://localhost/svc/";

    fn written(payload: &ODataPayload) -> String {
        String::from_utf8(write(payload, &WriteContext::new(ROOT, ProtocolVersion::V2)).unwrap()).unwrap()
    }

    #[test]
    fn feed_carries_count_entries_and_next_link() {
        let wrapper = northwind_wrapper(northwind_config());
        let serializer = ObjectModelSerializer::new(&wrapper, ROOT);
        let set = wrapper.resolve_resource_set("Customers").unwrap();
        let mut rows = EntityCollection::new(northwind_entities(&northwind_model())["Customers"].clone());
        rows.count = Some(3);
        let feed = serializer
            .feed(&rows, &set, None, "Customers", Some(format!("{ROOT}Customers?$skiptoken='BERGS'")))
            .unwrap();
        let out = written(&ODataPayload::Feed(feed));
        assert!(out.contains("<feed xml:base=\"http://localhost/svc/\""));
        assert!(out.contains("<m:count>3</m:count>"));
        assert_eq!(out.matches("<entry>").count(), 3);
        assert!(out.contains("<category term=\"NorthWind.Customer\""));
        assert!(out.contains(&format!("{RELATED_REL}Orders")));
        assert!(out.contains("<link rel=\"next\" href=\"http://localhost/svc/Customers?$skiptoken=&apos;BERGS&apos;\"/>"));
    }

    #[test]
    fn media_link_entries_put_properties_outside_content() {
        let wrapper = northwind_wrapper(northwind_config());
        let serializer = ObjectModelSerializer::new(&wrapper, ROOT);
        let set = wrapper.resolve_resource_set("Employees").unwrap();
        let emp1 = &northwind_entities(&northwind_model())["Employees"][0];
        let entry = serializer.entry(emp1, &set, None).unwrap();
        let out = written(&ODataPayload::Entry(entry));
        assert!(out.contains("<content type=\"application/octet-stream\" src=\"Employees(&apos;EMP1&apos;)/$value\"/>"));
        assert!(out.contains(&format!("{MEDIARESOURCE_REL}TumbNail_48X48")));
        assert!(out.contains("m:type=\"Bag(Edm.String)\""));
        assert!(out.contains("<d:element>nancy@example.com</d:element>"));
    }

    #[test]
    fn etag_is_an_entry_attribute() {
        let wrapper = northwind_wrapper(northwind_config());
        let serializer = ObjectModelSerializer::new(&wrapper, ROOT);
        let set = wrapper.resolve_resource_set("Products").unwrap();
        let chai = &northwind_entities(&northwind_model())["Products"][0];
        let out = written(&ODataPayload::Entry(serializer.entry(chai, &set, None).unwrap()));
        assert!(out.contains("m:etag=\"W/&quot;7L&quot;\""));
    }
}
