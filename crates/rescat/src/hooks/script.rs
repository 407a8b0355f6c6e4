//! Hook files: transforms and checkers written in TOML.
//!
//! A transform file is a list of steps applied to each resource in order:
//!
//! ```toml
//! [[step]]
//! set = "http_url"
//! value = "'http://files' + path"
//! when = "has('path') and path.startswith('/data')"
//!
//! [[step]]
//! add_tag = "published"
//! ```
//!
//! A checker file states which resources it knows about and the rules
//! they must satisfy:
//!
//! ```toml
//! name = "paths"
//! applies = "has('path')"
//!
//! [[rule]]
//! require = "extension(path) in ['.bam', '.csv']"
//! message = "unsupported file type"
//!
//! [[rule]]
//! exists = "path"
//! ```
//!
//! Expressions use the sandboxed expression language with the `default`
//! missing-attribute policy.

use std::fs;
use std::iter;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::{Checker, Verdict};
use crate::error::{Error, Result};
use crate::expr::{Expression, MissingPolicy};
use crate::resource::Resource;
use crate::tags::is_valid_tag;
use crate::value::Value;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TransformFile {
    #[serde(default, rename = "step")]
    steps: Vec<StepSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StepSpec {
    set: Option<String>,
    value: Option<String>,
    when: Option<String>,
    remove: Option<String>,
    add_tag: Option<String>,
    remove_tag: Option<String>,
}

#[derive(Debug, Clone)]
enum Action {
    Set { attribute: String, value: Expression },
    Remove(String),
    AddTag(String),
    RemoveTag(String),
}

#[derive(Debug, Clone)]
struct Step {
    action: Action,
    when: Option<Expression>,
}

/// A transform loaded from a hook file.
#[derive(Debug, Clone)]
pub struct TransformScript {
    name: String,
    steps: Vec<Step>,
}

impl TransformScript {
    /// Loads a transform file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|source| Error::Fetch {
            location: name.clone(),
            source,
        })?;
        Self::parse(name, &text)
    }

    /// Parses transform file text. `name` identifies the hook in errors.
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self> {
        let name = name.into();
        let file: TransformFile =
            toml::from_str(text).map_err(|e| Error::hook(&name, e.to_string().trim_end()))?;
        let steps = file
            .steps
            .into_iter()
            .enumerate()
            .map(|(i, spec)| {
                compile_step(spec).map_err(|msg| Error::hook(&name, format!("step {}: {}", i + 1, msg)))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(hook = %name, steps = steps.len(), "loaded transform");
        Ok(Self { name, steps })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Applies every step to one resource.
    pub fn apply(&self, resource: &mut Resource) -> Result<()> {
        for (i, step) in self.steps.iter().enumerate() {
            let resource_name = resource.name().to_string();
            let fail = |message: String| {
                Error::hook(
                    &self.name,
                    format!("step {} on '{}': {}", i + 1, resource_name, message),
                )
            };
            if let Some(when) = &step.when {
                if !when.matches(resource).map_err(|e| fail(e.to_string()))? {
                    continue;
                }
            }
            match &step.action {
                Action::Set { attribute, value } => {
                    let value = value
                        .evaluate(resource, MissingPolicy::Default)
                        .map_err(|e| fail(e.to_string()))?
                        .unwrap_or_default();
                    resource
                        .set(attribute.as_str(), value)
                        .map_err(|e| fail(e.to_string()))?;
                }
                Action::Remove(attribute) => {
                    resource.remove(attribute).map_err(|e| fail(e.to_string()))?;
                }
                Action::AddTag(tag) => {
                    resource.tags_mut().insert(tag.as_str());
                }
                Action::RemoveTag(tag) => {
                    if resource.tags().is_some() {
                        resource.tags_mut().remove(tag);
                    }
                }
            }
        }
        Ok(())
    }
}

fn compile_step(spec: StepSpec) -> std::result::Result<Step, String> {
    let StepSpec {
        set,
        value,
        when,
        remove,
        add_tag,
        remove_tag,
    } = spec;

    let actions = [&set, &remove, &add_tag, &remove_tag]
        .iter()
        .filter(|a| a.is_some())
        .count();
    if actions != 1 {
        return Err("exactly one of set, remove, add_tag or remove_tag is required".into());
    }
    if value.is_some() && set.is_none() {
        return Err("'value' is only valid with 'set'".into());
    }

    let compile = |text: &str| Expression::parse(text).map_err(|e| e.to_string());
    let check_tag = |tag: String| {
        if is_valid_tag(&tag) {
            Ok(tag)
        } else {
            Err(format!("invalid tag '{}'", tag))
        }
    };

    let action = if let Some(attribute) = set {
        let value = value.ok_or_else(|| format!("'set = \"{}\"' needs a 'value'", attribute))?;
        Action::Set {
            attribute,
            value: compile(&value)?,
        }
    } else if let Some(attribute) = remove {
        Action::Remove(attribute)
    } else if let Some(tag) = add_tag {
        Action::AddTag(check_tag(tag)?)
    } else if let Some(tag) = remove_tag {
        Action::RemoveTag(check_tag(tag)?)
    } else {
        return Err("step has no action".into());
    };

    let when = when.as_deref().map(compile).transpose()?;
    Ok(Step { action, when })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CheckerFile {
    name: Option<String>,
    applies: Option<String>,
    #[serde(default, rename = "rule")]
    rules: Vec<RuleSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleSpec {
    require: Option<String>,
    exists: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Clone)]
enum Rule {
    /// The expression must be truthy.
    Require {
        expression: Expression,
        message: Option<String>,
    },
    /// The attribute must name an existing filesystem path.
    Exists {
        attribute: String,
        message: Option<String>,
    },
}

impl Rule {
    fn verdict(&self, resource: &Resource) -> Verdict {
        match self {
            Rule::Require {
                expression,
                message,
            } => match expression.matches(resource) {
                Ok(true) => Verdict::accept(expression.source()),
                Ok(false) => Verdict::reject(
                    message
                        .clone()
                        .unwrap_or_else(|| format!("requirement failed: {}", expression.source())),
                ),
                Err(err) => Verdict::reject(format!("{}: {}", expression.source(), err)),
            },
            Rule::Exists { attribute, message } => {
                let rejected = |detail: String| {
                    Verdict::reject(message.clone().unwrap_or(detail))
                };
                match resource.lookup(attribute) {
                    Some(Value::String(path)) if Path::new(path).exists() => {
                        Verdict::accept(format!("{} exists", path))
                    }
                    Some(Value::String(path)) => rejected(format!("couldn't open path: {}", path)),
                    Some(other) => rejected(format!(
                        "'{}' is a {}, not a path",
                        attribute,
                        other.type_name()
                    )),
                    None => rejected(format!("no '{}' attribute", attribute)),
                }
            }
        }
    }
}

/// A checker loaded from a hook file.
#[derive(Debug, Clone)]
pub struct ScriptChecker {
    name: String,
    applies: Option<Expression>,
    rules: Vec<Rule>,
}

impl ScriptChecker {
    /// Loads a checker file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let location = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|source| Error::Fetch {
            location: location.clone(),
            source,
        })?;
        Self::parse(location, &text)
    }

    /// Parses checker file text. `location` names the checker unless the
    /// file sets `name`.
    pub fn parse(location: impl Into<String>, text: &str) -> Result<Self> {
        let location = location.into();
        let file: CheckerFile =
            toml::from_str(text).map_err(|e| Error::hook(&location, e.to_string().trim_end()))?;
        let fail = |message: String| Error::hook(&location, message);

        let applies = file
            .applies
            .as_deref()
            .map(Expression::parse)
            .transpose()
            .map_err(|e| fail(format!("applies: {}", e)))?;

        let mut rules = Vec::with_capacity(file.rules.len());
        for (i, spec) in file.rules.into_iter().enumerate() {
            let rule = match (spec.require, spec.exists) {
                (Some(require), None) => Rule::Require {
                    expression: Expression::parse(&require)
                        .map_err(|e| fail(format!("rule {}: {}", i + 1, e)))?,
                    message: spec.message,
                },
                (None, Some(attribute)) => Rule::Exists {
                    attribute,
                    message: spec.message,
                },
                _ => {
                    return Err(fail(format!(
                        "rule {}: exactly one of require or exists is required",
                        i + 1
                    )))
                }
            };
            rules.push(rule);
        }

        let name = file.name.unwrap_or(location);
        debug!(hook = %name, rules = rules.len(), "loaded checker");
        Ok(Self {
            name,
            applies,
            rules,
        })
    }
}

impl Checker for ScriptChecker {
    fn name(&self) -> &str {
        &self.name
    }

    fn check<'a>(&'a self, resource: &'a Resource) -> Box<dyn Iterator<Item = Verdict> + 'a> {
        if let Some(applies) = &self.applies {
            match applies.matches(resource) {
                Ok(true) => {}
                Ok(false) => return Box::new(iter::empty()),
                Err(err) => {
                    return Box::new(iter::once(Verdict::reject(format!(
                        "applies: {}",
                        err
                    ))))
                }
            }
        }
        if self.rules.is_empty() {
            return Box::new(iter::once(Verdict::accept("no rules")));
        }
        Box::new(self.rules.iter().map(move |rule| rule.verdict(resource)))
    }
}
