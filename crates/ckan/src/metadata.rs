//! INSPIRE package metadata and resource descriptors.
//!
//! Field names follow the data lake's INSPIRE schema; several of them
//! are mixed-case aliases (`identification_ResourceType`, ...).

use std::collections::BTreeMap;

use chrono::SecondsFormat;
use odm_core::naming::package_title;
use odm_core::types::{DatatypeId, Timestamp};
use odm_core::ProcessingRequest;
use serde::Serialize;

use crate::config::CkanConfig;
use crate::error::CkanError;

const CONFORMITY_TITLE: &str = "COMMISSION REGULATION (EU) No 1089/2010 of 23 November 2010 \
implementing Directive 2007/2/EC of the European Parliament and of the Council as regards \
interoperability of spatial data sets and services";

/// Body of `package_create`.
#[derive(Debug, Clone, Serialize)]
pub struct MetadataInspire {
    pub title: String,
    pub private: bool,
    pub notes: String,
    pub name: String,
    #[serde(rename = "identification_ResourceType")]
    pub ident_resource_type: String,
    pub owner_org: String,
    #[serde(rename = "identification_CoupledResource")]
    pub ident_coupled_resource: String,
    #[serde(rename = "identification_ResourceLanguage")]
    pub ident_res_language: String,
    #[serde(rename = "classification_TopicCategory")]
    pub classification_category: String,
    #[serde(rename = "classification_SpatialDataServiceType")]
    pub classification_spatial_dst: String,
    #[serde(rename = "keyword_KeywordValue")]
    pub keyword: String,
    #[serde(rename = "keyword_OriginatingControlledVocabulary")]
    pub keyword_vocabulary: String,
    pub data_temporal_extent_begin_date: String,
    pub data_temporal_extent_end_date: String,
    #[serde(rename = "temporalReference_dateOfPublication")]
    pub tref_date_publication: String,
    #[serde(rename = "temporalReference_dateOfLastRevision")]
    pub tref_date_revision: String,
    #[serde(rename = "temporalReference_dateOfCreation")]
    pub tref_date_creation: String,
    #[serde(rename = "temporalReference_date")]
    pub tref_date: String,
    pub quality_and_validity_lineage: String,
    pub quality_and_validity_spatial_resolution_latitude: String,
    pub quality_and_validity_spatial_resolution_longitude: String,
    pub quality_and_validity_spatial_resolution_scale: String,
    pub quality_and_validity_spatial_resolution_measureunit: String,
    pub conformity_specification_title: String,
    #[serde(rename = "conformity_specification_dateType")]
    pub conformity_specification_date_type: String,
    pub conformity_specification_date: String,
    pub conformity_degree: bool,
    pub constraints_conditions_for_access_and_use: String,
    pub constraints_limitation_on_public_access: String,
    pub responsable_organization_name: String,
    pub responsable_organization_email: String,
    pub responsable_organization_role: String,
    pub point_of_contact_name: String,
    pub point_of_contact_email: String,
    pub metadata_language: String,
    pub coordinatesystemreference_code: u32,
    pub coordinatesystemreference_codespace: String,
    pub character_encoding: String,
    /// GeoJSON geometry, serialized as a string.
    pub spatial: Option<String>,
    pub request_code: String,
    pub destinatary_organization: String,
    pub external_attributes: BTreeMap<String, String>,
}

impl MetadataInspire {
    /// Metadata of the package holding every result of `request`.
    ///
    /// `now` stamps the temporal reference dates.
    pub fn for_request(
        config: &CkanConfig,
        request: &ProcessingRequest,
        now: Timestamp,
    ) -> Result<Self, CkanError> {
        let spatial = request
            .geometry()
            .map(serde_json::to_string)
            .transpose()?;
        // Reference dates are naive UTC, without offset.
        let reference_date = now.naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
        let resolution = config.data.resolution.to_string();

        let external_attributes = BTreeMap::from([
            ("situation_id".to_string(), request.situation_id.clone()),
            ("request_code".to_string(), request.request_id.clone()),
            ("app_project".to_string(), config.app_project.clone()),
        ]);

        Ok(Self {
            title: package_title(&request.situation_id, &request.request_id),
            private: true,
            notes: format!("Drone acquisitions for request {}", request.request_id),
            name: uuid::Uuid::new_v4().to_string(),
            ident_resource_type: "dataset".into(),
            owner_org: config.owner_org.clone(),
            ident_coupled_resource: String::new(),
            ident_res_language: "eng".into(),
            classification_category: config.data.topic.clone(),
            classification_spatial_dst: String::new(),
            keyword: config.data.keywords.join(", "),
            keyword_vocabulary: "ontology".into(),
            data_temporal_extent_begin_date: request.start.to_rfc3339(),
            data_temporal_extent_end_date: request.end.to_rfc3339(),
            tref_date_publication: reference_date.clone(),
            tref_date_revision: reference_date.clone(),
            tref_date_creation: reference_date.clone(),
            tref_date: reference_date,
            quality_and_validity_lineage: "Quality approved".into(),
            quality_and_validity_spatial_resolution_latitude: resolution.clone(),
            quality_and_validity_spatial_resolution_longitude: resolution,
            quality_and_validity_spatial_resolution_scale: "0".into(),
            quality_and_validity_spatial_resolution_measureunit: "cm".into(),
            conformity_specification_title: CONFORMITY_TITLE.into(),
            conformity_specification_date_type: "publication".into(),
            conformity_specification_date: "2010-12-08T00:00:00".into(),
            conformity_degree: true,
            constraints_conditions_for_access_and_use:
                "Creative Commons CC BY-SA 3.0 IGO licence".into(),
            constraints_limitation_on_public_access: String::new(),
            responsable_organization_name: config.organization_name.clone(),
            responsable_organization_email: config.organization_email.clone(),
            responsable_organization_role: "author".into(),
            point_of_contact_name: config.organization_name.clone(),
            point_of_contact_email: config.organization_email.clone(),
            metadata_language: "eng".into(),
            coordinatesystemreference_code: 4326,
            coordinatesystemreference_codespace: "EPSG".into(),
            character_encoding: "UTF-8".into(),
            spatial,
            request_code: request.request_id.clone(),
            destinatary_organization: String::new(),
            external_attributes,
        })
    }
}

/// Form fields of `resource_create`, sent next to the `upload` file part.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceCreateRequest {
    pub package_id: String,
    pub datatype_resource: DatatypeId,
    pub file_date_start: Timestamp,
    pub file_date_end: Timestamp,
    /// File extension without the dot.
    pub format: String,
    pub name: String,
}

impl ResourceCreateRequest {
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("package_id", self.package_id.clone()),
            ("datatype_resource", self.datatype_resource.to_string()),
            (
                "file_date_start",
                self.file_date_start.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            (
                "file_date_end",
                self.file_date_end.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            ("format", self.format.clone()),
            ("name", self.name.clone()),
        ]
    }
}
