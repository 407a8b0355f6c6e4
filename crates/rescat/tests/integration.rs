//! End-to-end tests: files on disk through loading, hooks, queries and
//! writing.

use std::fs;
use std::path::Path;

use rescat::hooks::Outcome;
use rescat::{
    load, serialize, Error, ExpressionError, HookConfig, HookPipeline, Loader, MissingPolicy,
    Value,
};

const DATASETS: &str = r#"
from rescat import export

# Sequencing runs
export(
    "tumor_rna",
    path="/path/to/tumor_rna.bam",
    reads=1200,
    tags=["rna", "important"],
)
export("normal_rna", path="/path/to/normal_rna.bam", reads=900, tags=["rna"])
export("notes", **{"file type": "txt", "owner": {"name": "ana"}})
"#;

fn write(dir: &Path, name: &str, text: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path.display().to_string()
}

#[test]
fn inline_filter_matches_explicit_filter() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "datasets.py", DATASETS);

    let inline = load(&format!("{}#filter=tags.important", path)).unwrap();
    let explicit = load(&path).unwrap().filter("tags.important").unwrap();
    assert_eq!(inline, explicit);
    assert_eq!(inline.names(), vec!["tumor_rna"]);
}

#[test]
fn select_follows_missing_policy() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "datasets.py", DATASETS);
    let c = load(&path).unwrap();

    let reads = c.select_series("reads", MissingPolicy::Default).unwrap();
    assert_eq!(reads, vec![Value::from(1200), Value::from(900), Value::Null]);

    let reads = c.select_series("reads", MissingPolicy::Skip).unwrap();
    assert_eq!(reads.len(), 2);

    match c.select_series("reads", MissingPolicy::Error) {
        Err(Error::Expression(ExpressionError::MissingAttribute(attr))) => {
            assert_eq!(attr, "reads")
        }
        other => panic!("unexpected: {other:?}"),
    }

    let table = c
        .select(&["name", "kind: get('file type')", "owner.name"], MissingPolicy::Default)
        .unwrap();
    assert_eq!(table.columns(), &["name", "kind", "owner.name"]);
    let notes = &table.rows()[2];
    assert_eq!(notes.values()[1], Value::from("txt"));
    assert_eq!(notes.values()[2], Value::from("ana"));
    assert_eq!(table.rows()[0].values()[2], Value::Null);
}

#[test]
fn dump_and_reload_in_both_formats() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "datasets.py", DATASETS);
    let original = load(&path).unwrap();

    let json = write(dir.path(), "copy.json", &serialize::write_json(&original));
    let source = write(dir.path(), "copy.py", &serialize::write_source(&original));
    assert_eq!(load(&json).unwrap(), original);
    assert_eq!(load(&source).unwrap(), original);
    assert_eq!(
        load(&format!("{}#format=source", source)).unwrap(),
        original
    );
}

#[test]
fn transforms_compose_then_checkers_validate() {
    let dir = tempfile::tempdir().unwrap();
    let data = write(
        dir.path(),
        "v.json",
        r#"{"a": {"v": 1}, "b": {"v": 2}, "c": {"other": true}}"#,
    );
    let t1 = write(
        dir.path(),
        "plus_one.toml",
        "[[step]]\nset = \"v\"\nvalue = \"v + 1\"\nwhen = \"has('v')\"\n",
    );
    let t2 = write(
        dir.path(),
        "times_ten.toml",
        "[[step]]\nset = \"v\"\nvalue = \"v * 10\"\nwhen = \"has('v')\"\n",
    );
    let checker = write(
        dir.path(),
        "check.toml",
        "name = \"numbers\"\napplies = \"has('v')\"\n[[rule]]\nrequire = \"v >= 20\"\n",
    );
    let config = HookConfig::new()
        .transform(t1)
        .transform(t2)
        .checker(checker);
    let hooks = HookPipeline::from_config(&config).unwrap();
    let c = Loader::new().with_hooks(hooks.clone()).load(&data).unwrap();
    assert_eq!(c.get("a").unwrap()["v"], Value::from(20));
    assert_eq!(c.get("b").unwrap()["v"], Value::from(30));

    let report = hooks.validate(&c).unwrap();
    assert!(!report.is_success());
    assert_eq!(report.get("a").unwrap().outcome(), Outcome::Ok);
    assert_eq!(report.get("c").unwrap().outcome(), Outcome::Unmatched);
    let failed: Vec<_> = report.failures().map(|r| r.resource()).collect();
    assert_eq!(failed, vec!["c"]);
}

#[test]
fn structural_errors_abort_loading() {
    let dir = tempfile::tempdir().unwrap();
    let dup = write(dir.path(), "dup.py", "export('a')\nexport('a')\n");
    assert!(matches!(load(&dup), Err(Error::DuplicateName(name)) if name == "a"));

    let bad = write(dir.path(), "bad.py", "export('a', x=open('/etc/passwd'))\n");
    match load(&bad) {
        Err(Error::Parse(e)) => {
            assert_eq!(e.format, "source");
            assert_eq!(e.line, 1);
        }
        other => panic!("unexpected: {other:?}"),
    }

    assert!(matches!(
        load(&dir.path().join("missing.json").display().to_string()),
        Err(Error::Fetch { .. })
    ));
}
