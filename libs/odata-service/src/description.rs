//! Compilation of one request into a [`RequestDescription`].
//!
//! Query options are applied as a fixed sequence of steps, each consuming the
//! description and returning the next one:
//!
//! 1. declared-version checks
//! 2. applicability of options to the target
//! 3. `$filter`
//! 4. `$orderby`, with key synthesis when skip, top or paging is present
//! 5. `$skip` / `$top`, with server-side paging
//! 6. `$skiptoken`
//! 7. `$inlinecount` / `$count`
//! 8. `$expand` / `$select`
//! 9. version needs of the payload shape (bags, named streams)
//!
//! Every step that needs a newer protocol version raises the response
//! version through [`VersionNegotiator::raise`]. Paging only caps the page
//! size here; the 2.0 a next link needs is raised once a page is actually
//! truncated.

use crate::query::{QueryOptions, SystemOption};
use crate::version::VersionNegotiator;
use odata_errors::{ODataError, ODataResult, messages};
use odata_model::{MetadataProviderWrapper, ProtocolVersion, ResourceSetWrapper, ResourceType};
use odata_uri::{
    FilterInfo, OrderByInfo, RootProjectionNode, SegmentDescriptor, SegmentParser, SkipTokenInfo,
    TargetKind,
};
use std::sync::Arc;

/// Shape of the result a collection request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Entities,
    /// Entities plus the total count (`$inlinecount=allpages`).
    EntitiesWithCount,
    /// Only the count (`$count` segment).
    Count,
}

/// Compiled request: resolved segments, checked options and the negotiated version.
#[derive(Debug, Clone)]
pub struct RequestDescription {
    segments: Vec<SegmentDescriptor>,
    options: QueryOptions,
    versions: VersionNegotiator,
    filter: Option<FilterInfo>,
    order_by: Option<OrderByInfo>,
    skip: Option<u64>,
    top_option: Option<u64>,
    top: Option<u64>,
    page_size: Option<u32>,
    skip_token: Option<SkipTokenInfo>,
    query_type: QueryType,
    projection: Option<RootProjectionNode>,
}

impl RequestDescription {
    /// Parse `path` and apply `options` in order.
    ///
    /// # Errors
    /// Any segment, option or version failure, first one wins.
    pub fn compile(
        wrapper: &MetadataProviderWrapper,
        path: &str,
        options: QueryOptions,
        versions: VersionNegotiator,
    ) -> ODataResult<Self> {
        let segments = SegmentParser::new(wrapper).parse(path)?;
        Self::from_segments(wrapper, segments, options, versions)
    }

    /// Apply `options` to already parsed segments.
    ///
    /// # Errors
    /// Any option or version failure, first one wins.
    pub fn from_segments(
        wrapper: &MetadataProviderWrapper,
        segments: Vec<SegmentDescriptor>,
        options: QueryOptions,
        versions: VersionNegotiator,
    ) -> ODataResult<Self> {
        if segments.is_empty() {
            return Err(ODataError::internal(messages::syntax_error()));
        }
        let description = Self {
            segments,
            options,
            versions,
            filter: None,
            order_by: None,
            skip: None,
            top_option: None,
            top: None,
            page_size: None,
            skip_token: None,
            query_type: QueryType::Entities,
            projection: None,
        };
        let description = description
            .check_declared_version()?
            .check_applicability()?
            .apply_filter(wrapper)?
            .apply_order_by(wrapper)?
            .apply_skip_and_top()?
            .apply_skip_token()?
            .apply_count(wrapper)?
            .apply_projection(wrapper)?
            .apply_payload_versions(wrapper)?;
        tracing::debug!(
            target_kind = ?description.last_segment().target_kind,
            query_type = ?description.query_type,
            top = ?description.top,
            skip = ?description.skip,
            response_version = %description.versions.response_version(),
            "request compiled"
        );
        Ok(description)
    }

    fn check_declared_version(self) -> ODataResult<Self> {
        let needs_v2 = self.last_segment().is_count()
            || self.count_requested()?
            || self.options.has(SystemOption::Select);
        if needs_v2 {
            self.versions.require_request_version(ProtocolVersion::V2)?;
        }
        Ok(self)
    }

    fn check_applicability(self) -> ODataResult<Self> {
        let last = self.last_segment();
        let yields_entities = matches!(
            last.target_kind,
            TargetKind::Resource | TargetKind::Link | TargetKind::Singleton
        ) || last.is_count();
        let has = |o| self.options.has(o);

        if !self.is_collection_target()
            && (has(SystemOption::OrderBy)
                || has(SystemOption::Skip)
                || has(SystemOption::Top)
                || has(SystemOption::InlineCount)
                || has(SystemOption::Count))
        {
            return Err(not_applicable_set_options());
        }
        if has(SystemOption::Filter) && !yields_entities {
            return Err(not_applicable(SystemOption::Filter));
        }
        if has(SystemOption::SkipToken) && (last.is_count() || !self.is_collection_target()) {
            return Err(not_applicable(SystemOption::SkipToken));
        }
        let projectable = matches!(last.target_kind, TargetKind::Resource | TargetKind::Singleton)
            && last.resource_set.is_some();
        for option in [SystemOption::Expand, SystemOption::Select] {
            if has(option) && !projectable {
                return Err(not_applicable(option));
            }
        }
        Ok(self)
    }

    fn apply_filter(mut self, wrapper: &MetadataProviderWrapper) -> ODataResult<Self> {
        if let Some(text) = self.options.get(SystemOption::Filter) {
            let set = self.required_set(SystemOption::Filter)?;
            self.filter = Some(FilterInfo::parse(text, wrapper, &set)?);
        }
        Ok(self)
    }

    fn apply_order_by(mut self, wrapper: &MetadataProviderWrapper) -> ODataResult<Self> {
        if !self.is_collection_target() {
            return Ok(self);
        }
        let set = self.required_set(SystemOption::OrderBy)?;
        let explicit = self
            .options
            .get(SystemOption::OrderBy)
            .map(|text| OrderByInfo::parse(text, wrapper, &set))
            .transpose()?;
        let needs_keys = self.options.has(SystemOption::Skip)
            || self.options.has(SystemOption::Top)
            || self.paging_applies();
        self.order_by = if needs_keys {
            let ty = wrapper.resource_type(set.type_id())?;
            Some(explicit.unwrap_or_default().with_key_synthesis(ty))
        } else {
            explicit
        };
        Ok(self)
    }

    fn apply_skip_and_top(mut self) -> ODataResult<Self> {
        self.skip = self.numeric_option(SystemOption::Skip)?;
        self.top_option = self.numeric_option(SystemOption::Top)?;
        self.top = self.top_option;

        if self.paging_applies()
            && let Some(page_size) = self.target_set().and_then(|s| s.page_size())
        {
            let page = u64::from(page_size);
            if self.top_option.is_none_or(|top| top > page) {
                self.top = Some(page);
                self.page_size = Some(page_size);
            }
        }
        Ok(self)
    }

    fn apply_skip_token(mut self) -> ODataResult<Self> {
        let Some(token) = self.options.get(SystemOption::SkipToken) else {
            return Ok(self);
        };
        if !self.paging_applies() {
            let set = self.required_set(SystemOption::SkipToken)?;
            return Err(ODataError::bad_request(messages::skiptoken_non_paged(set.name())));
        }
        self.skip_token = Some(SkipTokenInfo::parse(token, self.order_by.as_ref())?);
        Ok(self)
    }

    fn apply_count(mut self, wrapper: &MetadataProviderWrapper) -> ODataResult<Self> {
        let count_segment = self.last_segment().is_count();
        let all_pages = self.count_requested()?;
        if count_segment && (self.options.has(SystemOption::InlineCount) || self.options.has(SystemOption::Count)) {
            return Err(ODataError::bad_request(messages::inlinecount_with_count_segment()));
        }
        if !(count_segment || all_pages) {
            return Ok(self);
        }
        if !wrapper.config().accept_count_requests {
            return Err(ODataError::bad_request(messages::count_disabled()));
        }
        self.versions = self.versions.raise(ProtocolVersion::V2)?;
        self.query_type = if count_segment {
            QueryType::Count
        } else {
            QueryType::EntitiesWithCount
        };
        Ok(self)
    }

    fn apply_projection(mut self, wrapper: &MetadataProviderWrapper) -> ODataResult<Self> {
        let expand = self.options.get(SystemOption::Expand);
        let select = self.options.get(SystemOption::Select);
        if expand.is_none() && select.is_none() {
            return Ok(self);
        }
        if select.is_some() && !wrapper.config().accept_projection_requests {
            return Err(ODataError::bad_request(messages::projection_disabled()));
        }
        let set = self.required_set(SystemOption::Expand)?;
        let projection = RootProjectionNode::parse(expand, select, wrapper, &set)?;
        if projection.is_selection_specified() {
            self.versions = self.versions.raise(ProtocolVersion::V2)?;
        }
        self.projection = Some(projection);
        Ok(self)
    }

    fn apply_payload_versions(mut self, wrapper: &MetadataProviderWrapper) -> ODataResult<Self> {
        let last = self.last_segment();
        let needs_v3 = match last.target_kind {
            TargetKind::Bag => true,
            TargetKind::Resource | TargetKind::Singleton if !last.is_count() => {
                let ty = self.target_type(wrapper)?;
                let node = self.projection.as_ref().map(RootProjectionNode::node);
                let selected = |name: &str| node.is_none_or(|n| n.includes(name));
                ty.is_some_and(|ty| {
                    ty.named_streams().any(selected)
                        || ty.properties().any(|p| p.kind().is_bag() && selected(p.name()))
                })
            }
            _ => false,
        };
        if needs_v3 {
            self.versions = self.versions.raise(ProtocolVersion::V3)?;
        }
        Ok(self)
    }

    fn numeric_option(&self, option: SystemOption) -> ODataResult<Option<u64>> {
        self.options
            .get(option)
            .map(|value| {
                value.trim().parse::<u64>().map_err(|_| {
                    ODataError::bad_request(messages::incorrect_argument_format(option.name(), value))
                })
            })
            .transpose()
    }

    /// Whether `$inlinecount=allpages` (or `$count=true`) was asked for.
    fn count_requested(&self) -> ODataResult<bool> {
        let inline = self
            .options
            .get(SystemOption::InlineCount)
            .map(|v| match v.trim() {
                "allpages" => Ok(true),
                "none" => Ok(false),
                _ => Err(ODataError::bad_request(messages::invalid_inlinecount())),
            })
            .transpose()?;
        let count = self
            .options
            .get(SystemOption::Count)
            .map(|v| match v.trim() {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(ODataError::bad_request(messages::invalid_count_option(other))),
            })
            .transpose()?;
        match (inline, count) {
            (Some(_), Some(_)) => Err(ODataError::bad_request(messages::duplicate_system_option(
                SystemOption::InlineCount.name(),
            ))),
            (Some(v), None) | (None, Some(v)) => Ok(v),
            (None, None) => Ok(false),
        }
    }

    fn required_set(&self, option: SystemOption) -> ODataResult<Arc<ResourceSetWrapper>> {
        self.target_set().cloned().ok_or_else(|| not_applicable(option))
    }

    /// Collection-valued entity target, `$count` included.
    #[must_use]
    pub fn is_collection_target(&self) -> bool {
        let last = self.last_segment();
        last.is_entity_collection() || last.is_count()
    }

    /// Server-side paging applies: a collection of entities or links (never
    /// `$count`) over a set with a page size.
    #[must_use]
    pub fn paging_applies(&self) -> bool {
        let last = self.last_segment();
        last.is_entity_collection()
            && matches!(last.target_kind, TargetKind::Resource | TargetKind::Link)
            && self.target_set().is_some_and(|s| s.has_paging())
    }

    #[must_use]
    pub fn segments(&self) -> &[SegmentDescriptor] {
        &self.segments
    }

    /// The last segment; compilation guarantees at least one.
    #[must_use]
    pub fn last_segment(&self) -> &SegmentDescriptor {
        &self.segments[self.segments.len() - 1]
    }

    #[must_use]
    pub fn target_set(&self) -> Option<&Arc<ResourceSetWrapper>> {
        self.last_segment().resource_set.as_ref()
    }

    /// # Errors
    /// Fails when the target type is not part of the model.
    pub fn target_type<'w>(&self, wrapper: &'w MetadataProviderWrapper) -> ODataResult<Option<&'w ResourceType>> {
        self.last_segment()
            .target_type
            .map(|id| wrapper.resource_type(id))
            .transpose()
    }

    #[must_use]
    pub const fn options(&self) -> &QueryOptions {
        &self.options
    }

    #[must_use]
    pub const fn versions(&self) -> VersionNegotiator {
        self.versions
    }

    /// Raise the response version for needs found after compilation.
    ///
    /// # Errors
    /// See [`VersionNegotiator::raise`].
    pub fn raise_response_version(&mut self, version: ProtocolVersion) -> ODataResult<()> {
        self.versions = self.versions.raise(version)?;
        Ok(())
    }

    #[must_use]
    pub const fn filter(&self) -> Option<&FilterInfo> {
        self.filter.as_ref()
    }

    #[must_use]
    pub const fn order_by(&self) -> Option<&OrderByInfo> {
        self.order_by.as_ref()
    }

    #[must_use]
    pub const fn skip(&self) -> Option<u64> {
        self.skip
    }

    /// Effective number of entities to return: `$top`, capped by the page size.
    #[must_use]
    pub const fn top(&self) -> Option<u64> {
        self.top
    }

    /// `$top` as given.
    #[must_use]
    pub const fn top_option(&self) -> Option<u64> {
        self.top_option
    }

    /// Page size, when it limits this response.
    #[must_use]
    pub const fn page_size(&self) -> Option<u32> {
        self.page_size
    }

    #[must_use]
    pub const fn skip_token(&self) -> Option<&SkipTokenInfo> {
        self.skip_token.as_ref()
    }

    #[must_use]
    pub const fn query_type(&self) -> QueryType {
        self.query_type
    }

    #[must_use]
    pub const fn projection(&self) -> Option<&RootProjectionNode> {
        self.projection.as_ref()
    }
}

fn not_applicable(option: SystemOption) -> ODataError {
    ODataError::bad_request(messages::query_option_not_applicable(option.name()))
}

fn not_applicable_set_options() -> ODataError {
    ODataError::bad_request(messages::set_query_options_not_applicable())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use odata_model::ServiceConfiguration;
    use odata_model::testing::{ALFKI_GUID, northwind_config, northwind_wrapper};
    use ProtocolVersion as V;

    fn compile_with(config: ServiceConfiguration, path: &str, query: &str) -> ODataResult<RequestDescription> {
        let max = config.max_protocol_version;
        let wrapper = northwind_wrapper(config);
        RequestDescription::compile(
            &wrapper,
            path,
            QueryOptions::parse(query)?,
            VersionNegotiator::new(None, None, max),
        )
    }

    fn compile(path: &str, query: &str) -> ODataResult<RequestDescription> {
        compile_with(northwind_config(), path, query)
    }

    fn alfki() -> String {
        format!("Customers(CustomerID='ALFKI',CustomerGuid=guid'{ALFKI_GUID}')")
    }

    fn clause_paths(d: &RequestDescription) -> Vec<String> {
        d.order_by()
            .unwrap()
            .clauses()
            .iter()
            .map(odata_uri::OrderByClause::path_text)
            .collect()
    }

    #[test]
    fn skip_and_top_synthesize_key_order() {
        let d = compile("Customers", "$skip=1&$top=2").unwrap();
        assert_eq!(d.skip(), Some(1));
        assert_eq!(d.top(), Some(2));
        assert_eq!(clause_paths(&d), ["CustomerID", "CustomerGuid"]);
        assert_eq!(d.order_by().unwrap().synthesized(), 2);
    }

    #[test]
    fn explicit_order_keeps_precedence() {
        let d = compile("Customers", "$orderby=Country desc,CustomerID&$top=2").unwrap();
        assert_eq!(clause_paths(&d), ["Country", "CustomerID", "CustomerGuid"]);
        let d = compile("Customers", "$orderby=Country").unwrap();
        assert_eq!(clause_paths(&d), ["Country"]);
    }

    #[test]
    fn malformed_skip_and_top_fail() {
        for query in ["$top=-1", "$top=abc", "$skip=1.5"] {
            let err = compile("Customers", query).unwrap_err();
            assert!(err.message().starts_with("Incorrect format for $"), "{query}");
        }
    }

    #[test]
    fn set_options_are_rejected_on_single_results() {
        let err = compile(&alfki(), "$top=1").unwrap_err();
        assert_eq!(err.message(), messages::set_query_options_not_applicable());
        let err = compile(&format!("{}/CustomerName", alfki()), "$orderby=CustomerID").unwrap_err();
        assert_eq!(err.message(), messages::set_query_options_not_applicable());
    }

    #[test]
    fn projection_needs_a_resource_target() {
        let err = compile(&format!("{}/Address", alfki()), "$expand=Orders").unwrap_err();
        assert_eq!(err.message(), messages::query_option_not_applicable("$expand"));
        let err = compile(&format!("{}/$links/Orders", alfki()), "$select=OrderID").unwrap_err();
        assert_eq!(err.message(), messages::query_option_not_applicable("$select"));
    }

    #[test]
    fn projection_can_be_disabled() {
        let mut config = northwind_config();
        config.accept_projection_requests = false;
        let err = compile_with(config.clone(), "Customers", "$select=CustomerName").unwrap_err();
        assert_eq!(err.message(), messages::projection_disabled());
        assert!(compile_with(config, "Customers", "$expand=Orders").is_ok());
    }

    #[test]
    fn paging_caps_top_without_raising_version() {
        let mut config = northwind_config();
        config.max_protocol_version = V::V2;
        config.set_entity_set_page_size("Customers", 2);
        let d = compile_with(config.clone(), "Customers", "").unwrap();
        assert_eq!(d.top(), Some(2));
        assert_eq!(d.page_size(), Some(2));
        assert_eq!(d.versions().response_version(), V::V1);
        assert_eq!(clause_paths(&d), ["CustomerID", "CustomerGuid"]);

        let d = compile_with(config.clone(), "Customers", "$top=1").unwrap();
        assert_eq!(d.top(), Some(1));
        assert_eq!(d.page_size(), None);
        assert_eq!(d.versions().response_version(), V::V1);

        let d = compile_with(config, "Customers/$count", "").unwrap();
        assert_eq!(d.top(), None);
        assert_eq!(d.query_type(), QueryType::Count);
    }

    #[test]
    fn skiptoken_needs_paging() {
        let err = compile("Customers", "$skiptoken='ALFKI'").unwrap_err();
        assert_eq!(err.message(), messages::skiptoken_non_paged("Customers"));

        let mut config = northwind_config();
        config.set_entity_set_page_size("Customers", 2);
        let d = compile_with(config, "Customers", &format!("$skiptoken='ALFKI',guid'{ALFKI_GUID}'")).unwrap();
        assert_eq!(d.skip_token().unwrap().values().len(), 2);
    }

    #[test]
    fn inline_count_and_count_option() {
        let d = compile("Customers", "$inlinecount=allpages").unwrap();
        assert_eq!(d.query_type(), QueryType::EntitiesWithCount);
        let d = compile("Customers", "$count=true").unwrap();
        assert_eq!(d.query_type(), QueryType::EntitiesWithCount);
        let d = compile("Customers", "$inlinecount=none").unwrap();
        assert_eq!(d.query_type(), QueryType::Entities);

        let err = compile("Customers", "$inlinecount=some").unwrap_err();
        assert_eq!(err.message(), messages::invalid_inlinecount());
        let err = compile("Customers", "$inlinecount=allpages&$count=true").unwrap_err();
        assert!(err.message().contains("$inlinecount"));
        let err = compile("Customers/$count", "$inlinecount=allpages").unwrap_err();
        assert_eq!(err.message(), messages::inlinecount_with_count_segment());
    }

    #[test]
    fn count_can_be_disabled() {
        let mut config = northwind_config();
        config.accept_count_requests = false;
        let err = compile_with(config.clone(), "Customers/$count", "").unwrap_err();
        assert_eq!(err.message(), messages::count_disabled());
        assert!(compile_with(config, "Customers", "$inlinecount=none").is_ok());
    }

    #[test]
    fn count_segment_checks_declared_version() {
        let wrapper = northwind_wrapper(northwind_config());
        let err = RequestDescription::compile(
            &wrapper,
            "Customers/$count",
            QueryOptions::default(),
            VersionNegotiator::new(Some(V::V1), None, V::V3),
        )
        .unwrap_err();
        assert_eq!(err.code(), "request_version_too_low");
    }

    #[test]
    fn bags_and_named_streams_need_v3() {
        let mut config = northwind_config();
        config.max_protocol_version = V::V2;
        let err = compile_with(config.clone(), "Employees", "").unwrap_err();
        assert_eq!(err.code(), "request_version_too_low");
        assert!(compile_with(config, "Customers", "").is_ok());

        let d = compile("Employees('EMP1')/Emails", "").unwrap();
        assert_eq!(d.versions().response_version(), V::V3);
    }

    #[test]
    fn filter_on_non_entity_targets_is_rejected() {
        let err = compile(&format!("{}/Address", alfki()), "$filter=true").unwrap_err();
        assert_eq!(err.message(), messages::query_option_not_applicable("$filter"));
        assert!(compile(&alfki(), "$filter=Rating gt 1").unwrap().filter().is_some());
    }
}
