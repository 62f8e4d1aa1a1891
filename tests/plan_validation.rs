use anyhow::Result;
use serde_json::json;
use stagewrite::config::JobConfig;
use stagewrite::plan::{ColumnType, Compression, FileFormat, WriteMode, WritePlan};
use stagewrite::testing::text_job_config;
use stagewrite::ErrorKind;

fn base() -> serde_json::Value {
    json!({
        "defaultFS": "hdfs://nn:8020",
        "fileType": "text",
        "path": "/warehouse/orders",
        "fileName": "orders",
        "column": [{"name": "id", "type": "BIGINT"}, {"name": "note", "type": "varchar"}],
        "writeMode": "append",
        "fieldDelimiter": "\t"
    })
}

fn with(mut value: serde_json::Value, key: &str, v: serde_json::Value) -> JobConfig {
    value[key] = v;
    JobConfig::from_value(value).unwrap()
}

fn without(mut value: serde_json::Value, key: &str) -> JobConfig {
    value.as_object_mut().unwrap().remove(key);
    JobConfig::from_value(value).unwrap()
}

fn kind_of(config: &JobConfig) -> ErrorKind {
    WritePlan::from_config(config).unwrap_err().kind
}

#[test]
fn minimal_text_plan_has_defaults() -> Result<()> {
    let plan = WritePlan::from_config(&JobConfig::from_value(base())?)?;
    assert_eq!(plan.format, FileFormat::Text);
    assert_eq!(plan.write_mode, WriteMode::Append);
    assert_eq!(plan.field_delimiter, '\t');
    assert_eq!(plan.compression, Compression::None);
    assert_eq!(plan.encoding, encoding_rs::UTF_8);
    assert_eq!(plan.null_format, "\\N");
    assert!(!plan.create_path);
    assert!(plan.kerberos.is_none());
    assert!(plan.post_commit.is_none());
    assert_eq!(plan.columns[0].column_type, ColumnType::Long);
    assert_eq!(plan.columns[1].column_type, ColumnType::String);
    Ok(())
}

#[test]
fn required_keys() {
    for key in ["defaultFS", "fileType", "path", "fileName", "writeMode", "fieldDelimiter"] {
        let kind = kind_of(&without(base(), key));
        assert_eq!(kind, ErrorKind::RequiredValue, "missing {key}");
    }
    assert_eq!(kind_of(&without(base(), "column")), ErrorKind::RequiredValue);
    assert_eq!(kind_of(&with(base(), "column", json!([]))), ErrorKind::RequiredValue);
}

#[test]
fn column_entries_need_name_and_type() {
    let cfg = with(base(), "column", json!([{"name": "id"}]));
    assert_eq!(kind_of(&cfg), ErrorKind::ColumnRequiredValue);
    let cfg = with(base(), "column", json!([{"type": "int"}]));
    assert_eq!(kind_of(&cfg), ErrorKind::ColumnRequiredValue);
    let cfg = with(base(), "column", json!([{"name": "id", "type": "map<string,int>"}]));
    assert_eq!(kind_of(&cfg), ErrorKind::IllegalValue);
}

#[test]
fn file_type_and_path_rules() {
    assert_eq!(kind_of(&with(base(), "fileType", json!("orc"))), ErrorKind::IllegalValue);
    assert_eq!(kind_of(&with(base(), "path", json!("relative/dir"))), ErrorKind::IllegalValue);
    assert_eq!(kind_of(&with(base(), "path", json!("/a/*/b"))), ErrorKind::IllegalValue);
    let plan = WritePlan::from_config(&with(base(), "fileType", json!("PARQUET"))).unwrap();
    assert_eq!(plan.format, FileFormat::Parquet);
}

#[test]
fn delimiter_must_be_one_character() {
    for bad in ["", ",,", "||", "abc"] {
        let cfg = with(base(), "fieldDelimiter", json!(bad));
        assert_eq!(kind_of(&cfg), ErrorKind::IllegalValue, "{bad:?}");
    }
    for good in [",", "|", "\u{1}", "é"] {
        let cfg = with(base(), "fieldDelimiter", json!(good));
        assert!(WritePlan::from_config(&cfg).is_ok(), "{good:?}");
    }
}

#[test]
fn compression_depends_on_format() {
    let text_gzip = with(base(), "compress", json!("gzip"));
    assert_eq!(WritePlan::from_config(&text_gzip).unwrap().compression, Compression::Gzip);
    let text_snappy = with(base(), "compress", json!("snappy"));
    assert_eq!(kind_of(&text_snappy), ErrorKind::IllegalValue);

    let mut parquet = base();
    parquet["fileType"] = json!("parquet");
    let parquet_snappy = with(parquet.clone(), "compress", json!("Snappy"));
    assert_eq!(
        WritePlan::from_config(&parquet_snappy).unwrap().compression,
        Compression::Snappy
    );
    let parquet_bzip2 = with(parquet, "compress", json!("BZIP2"));
    assert_eq!(kind_of(&parquet_bzip2), ErrorKind::IllegalValue);
}

#[test]
fn write_mode_is_normalised() {
    let plan = WritePlan::from_config(&with(base(), "writeMode", json!("  TRUNCATEALL "))).unwrap();
    assert_eq!(plan.write_mode, WriteMode::TruncateAll);
    assert_eq!(kind_of(&with(base(), "writeMode", json!("overwrite"))), ErrorKind::IllegalValue);
}

#[test]
fn kerberos_requires_keytab_and_principal() {
    let cfg = with(base(), "haveKerberos", json!(true));
    assert_eq!(kind_of(&cfg), ErrorKind::RequiredValue);

    let mut value = base();
    value["haveKerberos"] = json!("true");
    value["kerberosKeytabFilePath"] = json!("/etc/writer.keytab");
    value["kerberosPrincipal"] = json!("writer@EXAMPLE.COM");
    let plan = WritePlan::from_config(&JobConfig::from_value(value).unwrap()).unwrap();
    assert_eq!(plan.kerberos.unwrap().principal, "writer@EXAMPLE.COM");
}

#[test]
fn encoding_and_create_path() {
    let plan = WritePlan::from_config(&with(base(), "encoding", json!(" gbk "))).unwrap();
    assert_eq!(plan.encoding, encoding_rs::GBK);
    assert_eq!(kind_of(&with(base(), "encoding", json!("EBCDIC-XX"))), ErrorKind::IllegalValue);

    let plan = WritePlan::from_config(&with(base(), "isCreatePath", json!(" TRUE"))).unwrap();
    assert!(plan.create_path);
    assert_eq!(kind_of(&with(base(), "isCreatePath", json!("yes"))), ErrorKind::CreatePath);
}

#[test]
fn post_commit_is_all_or_nothing() {
    let mut value = base();
    value["hiveUrl"] = json!("jdbc:hive2://hs2:10000/default");
    value["hiveUser"] = json!("etl");
    let partial = JobConfig::from_value(value.clone()).unwrap();
    assert_eq!(kind_of(&partial), ErrorKind::IllegalValue);

    value["hivePassword"] = json!("secret");
    value["hql"] = json!("MSCK REPAIR TABLE orders");
    let plan = WritePlan::from_config(&JobConfig::from_value(value).unwrap()).unwrap();
    let action = plan.post_commit.unwrap();
    assert_eq!(action.statement, "MSCK REPAIR TABLE orders");
    assert!(!format!("{action:?}").contains("secret"));
}

#[test]
fn first_failing_check_wins() {
    // both fileType and writeMode are wrong; fileType is checked first
    let mut value = base();
    value["fileType"] = json!("csv");
    value["writeMode"] = json!("replace");
    let err = WritePlan::from_config(&JobConfig::from_value(value).unwrap()).unwrap_err();
    assert!(err.message.contains("TEXT and PARQUET"));
    assert!(err.to_string().starts_with("[StageWriter-02]"));
}

#[test]
fn fixture_config_is_valid() -> Result<()> {
    let plan = WritePlan::from_config(&text_job_config("/out", "nonConflict"))?;
    assert_eq!(plan.write_mode, WriteMode::NonConflict);
    assert!(plan.create_path);
    Ok(())
}
