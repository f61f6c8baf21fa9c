//! Table catalog - the static description of every PATSTAT table this tool loads
//!
//! Each entry carries the column schema, optional partition/clustering layout
//! and the row count the verifier compares against. Two schema layouts are
//! accepted: a compact comma-joined `name:TYPE` string (the builtin catalog
//! uses this) and an explicit per-column list (the layout a schema-discovery
//! pass produces). Both normalize to the same representation at load time so
//! malformed entries surface immediately, not at first use.

use crate::error::{LoaderError, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

/// Primitive warehouse column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Numeric,
    Bool,
    Date,
    Timestamp,
}

impl ColumnType {
    /// Parse a type name case-insensitively, accepting both the legacy and
    /// standard-SQL spellings.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STRING" => Ok(ColumnType::String),
            "INTEGER" | "INT64" => Ok(ColumnType::Integer),
            "FLOAT" | "FLOAT64" => Ok(ColumnType::Float),
            "NUMERIC" => Ok(ColumnType::Numeric),
            "BOOL" | "BOOLEAN" => Ok(ColumnType::Bool),
            "DATE" => Ok(ColumnType::Date),
            "TIMESTAMP" => Ok(ColumnType::Timestamp),
            _ => Err(LoaderError::Catalog(format!("unknown column type '{}'", s.trim()))),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::String => "STRING",
            ColumnType::Integer => "INTEGER",
            ColumnType::Float => "FLOAT",
            ColumnType::Numeric => "NUMERIC",
            ColumnType::Bool => "BOOL",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP",
        };
        write!(f, "{}", name)
    }
}

impl TryFrom<String> for ColumnType {
    type Error = LoaderError;

    fn try_from(s: String) -> Result<Self> {
        ColumnType::parse(&s)
    }
}

impl From<ColumnType> for String {
    fn from(ty: ColumnType) -> String {
        ty.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeGranularity {
    Day,
    Month,
    Year,
}

impl fmt::Display for TimeGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeGranularity::Day => "DAY",
            TimeGranularity::Month => "MONTH",
            TimeGranularity::Year => "YEAR",
        };
        write!(f, "{}", name)
    }
}

/// Storage-organization hint applied at table creation. Orthogonal to load
/// correctness; it only shapes the destination table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartitionSpec {
    IntegerRange {
        column: String,
        start: i64,
        end: i64,
        interval: i64,
    },
    Time {
        column: String,
        granularity: TimeGranularity,
    },
}

/// One destination table: ordered columns, optional layout hints, and the
/// row count the verifier expects after a full load.
#[derive(Debug, Clone)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub partition: Option<PartitionSpec>,
    pub clustering: Vec<String>,
    pub expected_rows: u64,
}

impl TableDefinition {
    /// Render the schema in the compact `name:TYPE,...` form the warehouse
    /// client consumes.
    pub fn schema_string(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("{}:{}", c.name, c.ty))
            .join(",")
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn partitioned(mut self, spec: PartitionSpec) -> Self {
        self.partition = Some(spec);
        self
    }

    fn clustered(mut self, columns: &[&str]) -> Self {
        self.clustering = columns.iter().map(|c| c.to_string()).collect();
        self
    }
}

/// The two schema layouts a catalog file may use for one table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SchemaLayout {
    /// Comma-joined `name:TYPE` pairs.
    Compact(String),
    /// One explicit entry per column.
    Explicit(Vec<ColumnDef>),
}

impl SchemaLayout {
    /// Normalize either layout into the internal column list.
    pub fn normalize(self) -> Result<Vec<ColumnDef>> {
        match self {
            SchemaLayout::Compact(s) => parse_compact_schema(&s),
            SchemaLayout::Explicit(columns) => {
                if columns.is_empty() {
                    return Err(LoaderError::Catalog("empty column list".to_string()));
                }
                Ok(columns)
            }
        }
    }
}

fn parse_compact_schema(s: &str) -> Result<Vec<ColumnDef>> {
    let mut columns = Vec::new();
    for entry in s.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(LoaderError::Catalog("empty schema entry".to_string()));
        }
        let (name, ty) = entry.split_once(':').ok_or_else(|| {
            LoaderError::Catalog(format!("schema entry '{}' is not name:TYPE", entry))
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(LoaderError::Catalog(format!(
                "schema entry '{}' has an empty column name",
                entry
            )));
        }
        columns.push(ColumnDef {
            name: name.to_string(),
            ty: ColumnType::parse(ty)?,
        });
    }
    Ok(columns)
}

/// One table entry as it appears in a catalog file.
#[derive(Debug, Deserialize)]
struct CatalogEntry {
    schema: SchemaLayout,
    #[serde(default)]
    partition: Option<PartitionSpec>,
    #[serde(default)]
    clustering: Vec<String>,
    #[serde(default)]
    expected_rows: u64,
}

/// Immutable table catalog, keyed by table name. Iteration order is sorted
/// by name, which is the order the orchestrator processes tables in.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: BTreeMap<String, TableDefinition>,
}

impl Catalog {
    pub fn insert(&mut self, def: TableDefinition) {
        self.tables.insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableDefinition> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Keep only the named tables. Returns the requested names that are not
    /// in the catalog so the caller can decide how loudly to complain.
    pub fn restrict_to(&mut self, keep: &[String]) -> Vec<String> {
        let wanted: BTreeSet<&str> = keep.iter().map(String::as_str).collect();
        let unknown = keep
            .iter()
            .filter(|name| !self.tables.contains_key(name.as_str()))
            .cloned()
            .collect();
        self.tables.retain(|name, _| wanted.contains(name.as_str()));
        unknown
    }

    /// Load a catalog from a JSON file mapping table name to
    /// `{ schema, partition?, clustering?, expected_rows? }`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LoaderError::Catalog(format!("failed to read {}: {}", path.display(), e))
        })?;
        let entries: BTreeMap<String, CatalogEntry> =
            serde_json::from_str(&content).map_err(|e| {
                LoaderError::Catalog(format!("failed to parse {}: {}", path.display(), e))
            })?;

        let mut catalog = Catalog::default();
        for (name, entry) in entries {
            let columns = entry.schema.normalize().map_err(|e| in_table(&name, e))?;
            catalog.insert(TableDefinition {
                name,
                columns,
                partition: entry.partition,
                clustering: entry.clustering,
                expected_rows: entry.expected_rows,
            });
        }
        Ok(catalog)
    }

    /// Builtin catalog covering the PATSTAT Global export set. Expected row
    /// counts match the edition these exports were cut from; pass a catalog
    /// file to load a different edition or subset.
    pub fn patstat() -> Self {
        fn t(name: &str, expected_rows: u64, schema: &str) -> TableDefinition {
            TableDefinition {
                name: name.to_string(),
                columns: parse_compact_schema(schema).expect("builtin PATSTAT schema"),
                partition: None,
                clustering: Vec::new(),
                expected_rows,
            }
        }
        fn by_id(column: &str, end: i64, interval: i64) -> PartitionSpec {
            PartitionSpec::IntegerRange {
                column: column.to_string(),
                start: 0,
                end,
                interval,
            }
        }
        fn by_year(column: &str) -> PartitionSpec {
            PartitionSpec::Time {
                column: column.to_string(),
                granularity: TimeGranularity::Year,
            }
        }

        let mut catalog = Catalog::default();
        let tables = [
            t("tls201_appln", 116_527_402,
                "appln_id:INTEGER,appln_auth:STRING,appln_nr:STRING,appln_kind:STRING,\
                 appln_filing_date:DATE,appln_filing_year:INTEGER,appln_nr_epodoc:STRING,\
                 appln_nr_original:STRING,ipr_type:STRING,receiving_office:STRING,\
                 internat_appln_id:INTEGER,int_phase:STRING,reg_phase:STRING,nat_phase:STRING,\
                 earliest_filing_date:DATE,earliest_filing_year:INTEGER,earliest_filing_id:INTEGER,\
                 earliest_publn_date:DATE,earliest_publn_year:INTEGER,earliest_pat_publn_id:INTEGER,\
                 granted:STRING,docdb_family_id:INTEGER,inpadoc_family_id:INTEGER,\
                 docdb_family_size:INTEGER,nb_citing_docdb_fam:INTEGER,nb_applicants:INTEGER,\
                 nb_inventors:INTEGER")
                .partitioned(by_id("appln_id", 1_000_000_000, 10_000_000))
                .clustered(&["appln_auth", "appln_filing_year"]),
            t("tls202_appln_title", 92_188_416,
                "appln_id:INTEGER,appln_title_lg:STRING,appln_title:STRING"),
            t("tls203_appln_abstr", 63_527_904,
                "appln_id:INTEGER,appln_abstract_lg:STRING,appln_abstract:STRING"),
            t("tls204_appln_prior", 21_334_588,
                "appln_id:INTEGER,prior_appln_id:INTEGER,prior_appln_seq_nr:INTEGER"),
            t("tls205_tech_rel", 1_270_344,
                "appln_id:INTEGER,tech_rel_appln_id:INTEGER"),
            t("tls206_person", 88_761_205,
                "person_id:INTEGER,person_name:STRING,person_name_orig_lg:STRING,\
                 person_address:STRING,person_ctry_code:STRING,nuts:STRING,nuts_level:INTEGER,\
                 doc_std_name_id:INTEGER,doc_std_name:STRING,psn_id:INTEGER,psn_name:STRING,\
                 psn_level:INTEGER,psn_sector:STRING,han_id:INTEGER,han_name:STRING,\
                 han_harmonized:INTEGER")
                .partitioned(by_id("person_id", 100_000_000, 1_000_000))
                .clustered(&["person_ctry_code"]),
            t("tls207_pers_appln", 329_404_166,
                "person_id:INTEGER,appln_id:INTEGER,applt_seq_nr:INTEGER,invt_seq_nr:INTEGER")
                .partitioned(by_id("appln_id", 1_000_000_000, 10_000_000)),
            t("tls209_appln_ipc", 302_455_969,
                "appln_id:INTEGER,ipc_class_symbol:STRING,ipc_class_level:STRING,\
                 ipc_version:DATE,ipc_value:STRING,ipc_position:STRING,ipc_gener_auth:STRING")
                .partitioned(by_id("appln_id", 1_000_000_000, 10_000_000))
                .clustered(&["ipc_class_symbol"]),
            t("tls210_appln_n_cls", 34_057_527,
                "appln_id:INTEGER,nat_class_symbol:STRING"),
            t("tls211_pat_publn", 148_141_702,
                "pat_publn_id:INTEGER,publn_auth:STRING,publn_nr:STRING,\
                 publn_nr_original:STRING,publn_kind:STRING,appln_id:INTEGER,publn_date:DATE,\
                 publn_lg:STRING,publn_first_grant:STRING,publn_claims:INTEGER")
                .partitioned(by_year("publn_date"))
                .clustered(&["publn_auth"]),
            t("tls212_citation", 398_560_490,
                "pat_publn_id:INTEGER,citn_replenished:INTEGER,citn_id:INTEGER,\
                 citn_origin:STRING,cited_pat_publn_id:INTEGER,cited_appln_id:INTEGER,\
                 pat_citn_seq_nr:INTEGER,cited_npl_publn_id:STRING,npl_citn_seq_nr:INTEGER,\
                 citn_gener_auth:STRING")
                .partitioned(by_id("pat_publn_id", 1_000_000_000, 10_000_000))
                .clustered(&["citn_origin"]),
            t("tls214_npl_publn", 42_152_377,
                "npl_publn_id:STRING,npl_type:STRING,npl_biblio:STRING,npl_author:STRING,\
                 npl_title1:STRING,npl_title2:STRING,npl_editor:STRING,npl_volume:STRING,\
                 npl_issue:STRING,npl_publn_date:STRING,npl_publn_end_date:STRING,\
                 npl_publisher:STRING,npl_page_first:STRING,npl_page_last:STRING,\
                 npl_abstract_nr:STRING,npl_doi:STRING,npl_isbn:STRING,npl_issn:STRING,\
                 online_availability:STRING,online_classification:STRING,online_search_date:STRING"),
            t("tls215_citn_categ", 100_287_516,
                "pat_publn_id:INTEGER,citn_replenished:INTEGER,citn_id:INTEGER,\
                 citn_categ:STRING,relevant_claim:INTEGER"),
            t("tls216_appln_contn", 2_298_311,
                "appln_id:INTEGER,parent_appln_id:INTEGER,contn_type:STRING"),
            t("tls222_appln_jp_class", 269_535_318,
                "appln_id:INTEGER,jp_class_scheme:STRING,jp_class_symbol:STRING"),
            t("tls223_appln_docus", 4_403_482,
                "appln_id:INTEGER,docus_class_symbol:STRING"),
            t("tls224_appln_cpc", 451_570_463,
                "appln_id:INTEGER,cpc_class_symbol:STRING")
                .partitioned(by_id("appln_id", 1_000_000_000, 10_000_000))
                .clustered(&["cpc_class_symbol"]),
            t("tls225_docdb_fam_cpc", 356_853_509,
                "docdb_family_id:INTEGER,cpc_class_symbol:STRING,cpc_gener_auth:STRING,\
                 cpc_version:DATE,cpc_position:STRING,cpc_value:STRING,cpc_action_date:DATE,\
                 cpc_status:STRING,cpc_data_source:STRING")
                .partitioned(by_id("docdb_family_id", 100_000_000, 1_000_000))
                .clustered(&["cpc_class_symbol"]),
            t("tls226_person_orig", 133_860_411,
                "person_orig_id:INTEGER,person_id:INTEGER,source:STRING,source_version:STRING,\
                 name_freeform:STRING,person_name_orig_lg:STRING,last_name:STRING,\
                 first_name:STRING,middle_name:STRING,address_freeform:STRING,\
                 address_1:STRING,address_2:STRING,address_3:STRING,address_4:STRING,\
                 address_5:STRING,street:STRING,city:STRING,zip_code:STRING,state:STRING,\
                 person_ctry_code:STRING,residence_ctry_code:STRING,role:STRING"),
            t("tls227_pers_publn", 457_227_516,
                "person_id:INTEGER,pat_publn_id:INTEGER,applt_seq_nr:INTEGER,\
                 invt_seq_nr:INTEGER")
                .partitioned(by_id("person_id", 100_000_000, 1_000_000)),
            t("tls228_docdb_fam_citn", 245_613_002,
                "docdb_family_id:INTEGER,cited_docdb_family_id:INTEGER"),
            t("tls229_appln_nace2", 167_357_514,
                "appln_id:INTEGER,nace2_code:STRING,weight:FLOAT"),
            t("tls230_appln_techn_field", 126_724_542,
                "appln_id:INTEGER,techn_field_nr:INTEGER,weight:FLOAT"),
            t("tls231_inpadoc_legal_event", 398_275_018,
                "event_id:INTEGER,appln_id:INTEGER,event_seq_nr:INTEGER,event_type:STRING,\
                 event_auth:STRING,event_code:STRING,event_filing_date:DATE,\
                 event_publn_date:DATE,event_effective_date:DATE,event_text:STRING,\
                 ref_doc_auth:STRING,ref_doc_nr:STRING,ref_doc_kind:STRING,ref_doc_date:DATE,\
                 party_type:STRING,party_seq_nr:INTEGER,party_new:STRING,party_old:STRING,\
                 fee_country:STRING,fee_payment_date:DATE,fee_renewal_year:INTEGER,\
                 lapse_country:STRING,lapse_date:DATE,reinstate_country:STRING,\
                 reinstate_date:DATE,class_scheme:STRING,class_symbol:STRING")
                .partitioned(by_year("event_publn_date"))
                .clustered(&["event_auth"]),
            t("tls801_country", 242,
                "ctry_code:STRING,iso_alpha3:STRING,st3_name:STRING,organisation_flag:STRING,\
                 continent:STRING,eu_member:STRING,epo_member:STRING,oecd_member:STRING,\
                 discontinued:STRING"),
            t("tls803_legal_event_code", 4_912,
                "event_auth:STRING,event_code:STRING,event_impact:STRING,event_descr:STRING,\
                 event_descr_orig:STRING,event_category_code:STRING,event_category_title:STRING"),
            t("tls901_techn_field_ipc", 768,
                "ipc_maingroup_symbol:STRING,techn_field_nr:INTEGER,techn_sector:STRING,\
                 techn_field:STRING"),
            t("tls902_ipc_nace2", 1_075,
                "ipc:STRING,not_with_ipc:STRING,unless_with_ipc:STRING,nace2_code:STRING,\
                 nace2_weight:FLOAT,nace2_descr:STRING"),
            t("tls904_nuts", 2_356,
                "nuts:STRING,nuts_level:INTEGER,nuts_label:STRING"),
        ];
        for def in tables {
            catalog.insert(def);
        }
        catalog
    }
}

fn in_table(table: &str, err: LoaderError) -> LoaderError {
    match err {
        LoaderError::Catalog(msg) => LoaderError::Catalog(format!("table {}: {}", table, msg)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compact_schema() {
        let columns = parse_compact_schema("appln_id:INTEGER, appln_auth:STRING,weight:float")
            .unwrap();
        assert_eq!(columns.len(), 3);
        assert_eq!(columns[0].name, "appln_id");
        assert_eq!(columns[0].ty, ColumnType::Integer);
        assert_eq!(columns[2].ty, ColumnType::Float);
    }

    #[test]
    fn test_parse_compact_schema_rejects_malformed() {
        assert!(parse_compact_schema("appln_id INTEGER").is_err());
        assert!(parse_compact_schema("appln_id:WIDGET").is_err());
        assert!(parse_compact_schema(":INTEGER").is_err());
        assert!(parse_compact_schema("").is_err());
    }

    #[test]
    fn test_schema_layout_normalizes_both_forms() {
        let compact: SchemaLayout = serde_json::from_str("\"a:INTEGER,b:STRING\"").unwrap();
        let explicit: SchemaLayout = serde_json::from_str(
            r#"[{"name":"a","type":"INTEGER"},{"name":"b","type":"STRING"}]"#,
        )
        .unwrap();
        assert_eq!(compact.normalize().unwrap(), explicit.normalize().unwrap());
    }

    #[test]
    fn test_schema_string_renders_uppercase_types() {
        let def = TableDefinition {
            name: "t".to_string(),
            columns: parse_compact_schema("a:int64,b:boolean").unwrap(),
            partition: None,
            clustering: Vec::new(),
            expected_rows: 0,
        };
        assert_eq!(def.schema_string(), "a:INTEGER,b:BOOL");
    }

    #[test]
    fn test_patstat_catalog_is_well_formed() {
        let catalog = Catalog::patstat();
        assert!(catalog.len() >= 24);
        let appln = catalog.get("tls201_appln").unwrap();
        assert_eq!(appln.columns[0].name, "appln_id");
        assert!(appln.partition.is_some());
        assert_eq!(catalog.get("tls801_country").unwrap().expected_rows, 242);
        // BTreeMap iteration must hand tables out in sorted name order.
        let names: Vec<&str> = catalog.names().collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_restrict_to_reports_unknown_names() {
        let mut catalog = Catalog::patstat();
        let unknown = catalog.restrict_to(&[
            "tls801_country".to_string(),
            "tls999_missing".to_string(),
        ]);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("tls801_country").is_some());
        assert_eq!(unknown, vec!["tls999_missing".to_string()]);
    }

    #[test]
    fn test_from_file_accepts_both_layouts() {
        let path = std::env::temp_dir().join(format!("patload_catalog_{}.json", uuid::Uuid::new_v4()));
        let content = r#"{
            "tls801_country": {
                "schema": "ctry_code:STRING,st3_name:STRING",
                "expected_rows": 242
            },
            "tls904_nuts": {
                "schema": [
                    {"name": "nuts", "type": "STRING"},
                    {"name": "nuts_level", "type": "INTEGER"}
                ],
                "clustering": ["nuts"]
            }
        }"#;
        std::fs::write(&path, content).unwrap();

        let catalog = Catalog::from_file(&path).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("tls801_country").unwrap().expected_rows, 242);
        let nuts = catalog.get("tls904_nuts").unwrap();
        assert_eq!(nuts.columns[1].ty, ColumnType::Integer);
        assert_eq!(nuts.clustering, vec!["nuts".to_string()]);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_from_file_rejects_bad_type() {
        let path = std::env::temp_dir().join(format!("patload_catalog_{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"t": {"schema": "a:WIDGET"}}"#).unwrap();
        let err = Catalog::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("WIDGET") || err.to_string().contains("parse"));
        let _ = std::fs::remove_file(&path);
    }
}
