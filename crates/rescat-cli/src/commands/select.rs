use std::io::Write;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{bail, Result};
use rescat::{FieldSpec, ResourceCollection, Table, Value};

use super::{output, Context};
use crate::cli::{SelectArgs, SelectFormat, Toggle};

/// How a value becomes a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    /// Strings as-is, sequences space-joined, maps as JSON.
    Best,
    /// Scalars as text, everything else as JSON.
    String,
    /// Sequences space-joined, scalars as text.
    Joined,
    Json,
}

impl FromStr for Kind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "best" => Ok(Kind::Best),
            "string" => Ok(Kind::String),
            "joined" => Ok(Kind::Joined),
            "json" => Ok(Kind::Json),
            other => bail!(
                "unsupported field kind '{}' (expected best, string, joined or json)",
                other
            ),
        }
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn joined(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(" ")
}

fn render(kind: Kind, value: &Value) -> String {
    match (kind, value) {
        (Kind::Json, value) => value.to_json().to_string(),
        (Kind::Best | Kind::Joined, Value::List(items)) => {
            joined(items.iter().map(|item| render(Kind::Best, item)))
        }
        (Kind::Best | Kind::Joined, Value::Tags(tags)) => joined(tags.iter().cloned()),
        (Kind::String, Value::List(_) | Value::Tags(_) | Value::Map(_)) => {
            value.to_json().to_string()
        }
        (_, value) => scalar(value),
    }
}

struct Column {
    kind: Kind,
    spec: FieldSpec,
}

fn is_word(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphanumeric() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// An argument name for a field given only as an expression.
fn argument_name(spec: FieldSpec) -> Result<FieldSpec> {
    if !is_word(spec.name()) {
        bail!(
            "specify an explicit argument name for complex field '{}'",
            spec.name()
        );
    }
    Ok(FieldSpec::named(
        &spec.name().replace('_', "-"),
        spec.expression().source(),
    )?)
}

fn column(parts: &[String], format: SelectFormat) -> Result<Column> {
    let (kind, spec) = match parts {
        [expression] => {
            let spec = FieldSpec::parse(expression)?;
            let spec = match format {
                SelectFormat::Args => argument_name(spec)?,
                SelectFormat::Csv => spec,
            };
            (Kind::Best, spec)
        }
        [name, expression] => (Kind::Best, FieldSpec::named(name, expression)?),
        [kind, name, expression] => (kind.parse()?, FieldSpec::named(name, expression)?),
        _ => bail!("--field takes one to three values: [KIND] [NAME] EXPR"),
    };
    Ok(Column { kind, spec })
}

/// Every attribute in the collection, `name` and `tags` first.
fn all_columns(collection: &ResourceCollection) -> Result<Vec<Column>> {
    collection
        .fields()
        .into_iter()
        .map(|field| -> Result<Column> {
            let lookup = format!("get({})", serde_json::to_string(&field)?);
            Ok(Column {
                kind: Kind::Best,
                spec: FieldSpec::named(&field, &lookup)?,
            })
        })
        .collect()
}

pub fn run(ctx: &Context, args: &SelectArgs) -> Result<ExitCode> {
    let collection = ctx.load(&args.load, ctx.hooks()?)?;

    let columns = if args.all_fields {
        all_columns(&collection)?
    } else if !args.fields.is_empty() {
        args.fields
            .iter()
            .map(|parts| column(parts, args.format))
            .collect::<Result<Vec<_>>>()?
    } else {
        eprintln!(
            "No fields selected. Use --field to select a field, or --all-fields to select all fields.\n"
        );
        eprintln!(
            "Fields found in your collection:\n\t{}",
            collection.fields().join(", ")
        );
        return Ok(ExitCode::SUCCESS);
    };

    let specs: Vec<FieldSpec> = columns.iter().map(|c| c.spec.clone()).collect();
    let table = collection.select_specs(&specs, args.missing)?;
    let kinds: Vec<Kind> = columns.iter().map(|c| c.kind).collect();

    let mut out = output(args.out.as_deref())?;
    match args.format {
        SelectFormat::Csv => {
            let header = match args.header {
                Some(Toggle::On) => true,
                Some(Toggle::Off) => false,
                None => columns.len() > 1,
            };
            write_csv(&mut out, &table, &kinds, header)?;
        }
        SelectFormat::Args => write_args(&mut out, &table, &kinds)?,
    }
    out.flush()?;
    Ok(ExitCode::SUCCESS)
}

fn cells<'a>(table: &'a Table, kinds: &'a [Kind]) -> impl Iterator<Item = Vec<String>> + 'a {
    table.rows().iter().map(move |row| {
        row.values()
            .iter()
            .zip(kinds)
            .map(|(value, kind)| render(*kind, value))
            .collect()
    })
}

fn write_csv(out: &mut dyn Write, table: &Table, kinds: &[Kind], header: bool) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    if header {
        let mut names = table.columns().to_vec();
        if let Some(first) = names.first_mut() {
            first.insert_str(0, "# ");
        }
        writer.write_record(&names)?;
    }
    for row in cells(table, kinds) {
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// One line per resource: `--name value --other value`, shell-quoted.
fn write_args(out: &mut dyn Write, table: &Table, kinds: &[Kind]) -> Result<()> {
    for row in cells(table, kinds) {
        let words: Vec<String> = table
            .columns()
            .iter()
            .zip(&row)
            .flat_map(|(name, value)| [format!("--{}", name), value.clone()])
            .collect();
        writeln!(out, "{}", shell_words::join(&words))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rescat::{MissingPolicy, Resource, TagSet};

    fn table() -> (Table, Vec<Kind>) {
        let collection = ResourceCollection::new([
            Resource::new("a")
                .with("path", "/x y.bam")
                .with_tags(["rna", "important"]),
            Resource::new("b").with("path", "/z.bam"),
        ])
        .unwrap();
        let table = collection
            .select(&["name", "path", "tags"], MissingPolicy::Default)
            .unwrap();
        (table, vec![Kind::Best; 3])
    }

    #[test]
    fn renders_cells() {
        let list = Value::from(vec![Value::from(1), Value::from("a")]);
        assert_eq!(render(Kind::Best, &list), "1 a");
        assert_eq!(render(Kind::String, &list), "[1,\"a\"]");
        assert_eq!(render(Kind::Json, &Value::from("a")), "\"a\"");
        assert_eq!(render(Kind::Best, &Value::Null), "");
        assert_eq!(render(Kind::Best, &Value::from(true)), "true");
        let tags = Value::Tags(TagSet::new(["b", "a"]));
        assert_eq!(render(Kind::Joined, &tags), "a b");
        let map = Value::Map(vec![("k".into(), Value::from(1))]);
        assert_eq!(render(Kind::Best, &map), "{\"k\":1}");
    }

    #[test]
    fn csv_header_marks_first_column() {
        let (table, kinds) = table();
        let mut out = Vec::new();
        write_csv(&mut out, &table, &kinds, true).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "# name,path,tags\na,/x y.bam,important rna\nb,/z.bam,\n"
        );
    }

    #[test]
    fn args_are_shell_quoted() {
        let (table, kinds) = table();
        let mut out = Vec::new();
        write_args(&mut out, &table, &kinds).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "--name a --path '/x y.bam' --tags 'important rna'\n--name b --path /z.bam --tags ''\n"
        );
    }

    #[test]
    fn field_forms() {
        let parts = |p: &[&str]| p.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let c = column(&parts(&["read_count"]), SelectFormat::Args).unwrap();
        assert_eq!(c.spec.name(), "read-count");
        assert!(column(&parts(&["reads * 2"]), SelectFormat::Args).is_err());
        assert_eq!(
            column(&parts(&["reads * 2"]), SelectFormat::Csv).unwrap().spec.name(),
            "reads * 2"
        );

        let c = column(&parts(&["json", "meta", "owner"]), SelectFormat::Csv).unwrap();
        assert_eq!(c.kind, Kind::Json);
        assert_eq!(c.spec.name(), "meta");
        assert!(column(&parts(&["yaml", "meta", "owner"]), SelectFormat::Csv).is_err());
    }
}
