//! Request bodies used by the attribution engine, resolver and aggregator.

use serde_json::{json, Value};

use super::request::SearchRequest;
use crate::aggregation::AggKind;
use crate::quality::MaterialCondition;

/// Name under which single-aggregation requests register their aggregation.
pub const AGG_NAME: &str = "my-agg";

/// `_source` fields needed to resolve a clicked resource.
pub const RESOURCE_SOURCE_FIELDS: &[&str] = &[
    "properties.cclom:title",
    "properties.cm:name",
    "collections.path",
    "properties.ccm:replicationsource",
    "properties.cm:creator",
];

/// `_source` fields of a node listed in a quality report.
pub const NODE_SOURCE_FIELDS: &[&str] = &[
    "nodeRef",
    "type",
    "properties.cclom:title",
    "properties.cm:name",
    "properties.ccm:wwwurl",
];

pub const LICENSE_FIELD: &str = "properties.ccm:commonlicense_key.keyword";
/// Aggregation name of [`statistic_counts`].
pub const LICENSE_AGG: &str = "license";
/// License keys that are present on a material but name no usable license.
pub const MISSING_LICENSE_KEYS: &[&str] = &["NONE", "", "UNTERRICHTS_UND_LEHRMEDIEN"];

/// Restricts workspace queries to published learning objects, optionally
/// inside one collection (either below it in the path or the collection itself).
pub fn base_condition(collection_id: Option<&str>, additional_must: Option<Value>) -> Value {
    let mut must = vec![
        json!({"terms": {"type": ["ccm:io"]}}),
        json!({"terms": {"permissions.read": ["GROUP_EVERYONE"]}}),
        json!({"terms": {"properties.cm:edu_metadataset": ["mds_oeh"]}}),
        json!({"terms": {"nodeRef.storeRef.protocol": ["workspace"]}}),
    ];
    if let Some(extra) = additional_must {
        must.push(extra);
    }
    if let Some(id) = collection_id {
        must.push(json!({
            "bool": {
                "should": [
                    {"match": {"collections.path": id}},
                    {"match": {"collections.nodeRef.id": id}},
                ],
                "minimum_should_match": 1
            }
        }));
    }
    json!({"bool": {"must": must}})
}

/// Events newer than `since` (exclusive) up to now, newest first.
pub fn click_events(since: &str, max_events: usize) -> SearchRequest {
    SearchRequest::new()
        .query(json!({
            "range": {
                "timestamp": {
                    "gt": since,
                    "lt": "now"
                }
            }
        }))
        .size(max_events)
        .sort_desc("timestamp")
}

/// Metadata lookup for one resource by node id.
pub fn resource_lookup(resource_id: &str) -> SearchRequest {
    SearchRequest::new()
        .query(json!({"match": {"nodeRef.id": resource_id}}))
        .source(RESOURCE_SOURCE_FIELDS)
}

/// Single aggregation over `attribute`; no hits are returned.
pub fn attribute_aggregation(
    attribute: &str,
    kind: AggKind,
    size: usize,
    scope: Option<Value>,
) -> SearchRequest {
    let agg = match kind {
        AggKind::Terms => json!({"terms": {"field": attribute, "size": size}}),
        AggKind::Missing => json!({"missing": {"field": attribute}}),
    };
    let mut request = SearchRequest::new().size(0).agg(AGG_NAME, agg);
    request.query = scope;
    request
}

/// Published collections (`ccm:map`) at or below `collection_id`.
pub fn collection_condition(collection_id: &str) -> Value {
    json!({
        "bool": {
            "must": [
                {"terms": {"type": ["ccm:map"]}},
                {"terms": {"permissions.read": ["GROUP_EVERYONE"]}},
                {
                    "bool": {
                        "should": [
                            {"match": {"path": collection_id}},
                            {"match": {"nodeRef.id": collection_id}},
                        ],
                        "minimum_should_match": 1
                    }
                }
            ]
        }
    })
}

fn without_attribute(condition: Value, attribute: &str) -> Value {
    json!({
        "bool": {
            "must": [condition],
            "must_not": [{"wildcard": {attribute: "*"}}]
        }
    })
}

fn node_listing(query: Value, count: usize) -> SearchRequest {
    SearchRequest::new()
        .query(query)
        .source(NODE_SOURCE_FIELDS)
        .size(count)
        .track_total_hits()
}

/// Materials in `collection_id` with no value at all for `attribute`.
/// With `count == 0` only the total is returned.
pub fn materials_missing_attribute(collection_id: &str, attribute: &str, count: usize) -> SearchRequest {
    node_listing(
        without_attribute(base_condition(Some(collection_id), None), attribute),
        count,
    )
}

/// Collections at or below `collection_id` with no value for `attribute`.
pub fn collections_missing_attribute(collection_id: &str, attribute: &str, count: usize) -> SearchRequest {
    node_listing(
        without_attribute(collection_condition(collection_id), attribute),
        count,
    )
}

/// Materials in `collection_id`, optionally narrowed by a named condition.
pub fn materials_by_condition(
    collection_id: &str,
    condition: Option<MaterialCondition>,
    count: usize,
) -> SearchRequest {
    let extra = condition.map(|c| match c {
        MaterialCondition::MissingLicense => {
            json!({"terms": {LICENSE_FIELD: MISSING_LICENSE_KEYS}})
        }
    });
    node_listing(base_condition(Some(collection_id), extra), count)
}

/// Material total of `collection_id` plus a terms aggregation over `attribute`.
pub fn statistic_counts(collection_id: &str, attribute: &str) -> SearchRequest {
    SearchRequest::new()
        .query(base_condition(Some(collection_id), None))
        .agg(LICENSE_AGG, json!({"terms": {"field": attribute}}))
        .size(0)
        .track_total_hits()
}

/// Collections below `portal_id` (the portal itself excluded).
pub fn portal_collections(portal_id: &str, count: usize) -> SearchRequest {
    let query = json!({
        "bool": {
            "must": [
                {"terms": {"type": ["ccm:map"]}},
                {"terms": {"permissions.read": ["GROUP_EVERYONE"]}},
                {"match": {"path": portal_id}}
            ]
        }
    });
    node_listing(query, count)
}
