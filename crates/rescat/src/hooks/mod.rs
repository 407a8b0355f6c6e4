//! Transform and checker hooks run over a loaded collection.
//!
//! ```text
//! load
//!   → TRANSFORMS ← (each transform over every resource, in list order)
//!   → queries (filter, select, write)
//!
//! validate (opt-in)
//!   → CHECKERS ← (verdicts per resource, collected into a report)
//! ```
//!
//! Transforms mutate resources in place and run immediately after load.
//! Checkers never mutate; a checker that does not recognize a resource
//! yields no verdicts for it. A resource passes validation when some
//! checker accepts it and none reject it.
//!
//! Both kinds come either from Rust closures or from TOML hook files, see
//! [`TransformScript`] and [`ScriptChecker`].

mod config;
mod script;

use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::collection::ResourceCollection;
use crate::error::{Error, Result};
use crate::resource::Resource;

pub use config::{HookConfig, CHECKERS_VAR, TRANSFORMS_VAR};
pub use script::{ScriptChecker, TransformScript};

/// One checker's judgement about one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub accepted: bool,
    pub message: String,
}

impl Verdict {
    pub fn accept(message: impl Into<String>) -> Self {
        Self {
            accepted: true,
            message: message.into(),
        }
    }

    pub fn reject(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            message: message.into(),
        }
    }
}

/// A source of verdicts about resources.
pub trait Checker {
    /// Label used in reports.
    fn name(&self) -> &str;

    /// Verdicts about `resource`, produced lazily. Empty when the checker
    /// does not recognize the resource.
    fn check<'a>(&'a self, resource: &'a Resource) -> Box<dyn Iterator<Item = Verdict> + 'a>;
}

/// Type alias for transform functions.
pub type TransformFn = Rc<dyn Fn(&mut Resource) -> Result<()>>;

/// Functions usable as checkers.
///
/// Implemented for every `Fn(&Resource) -> impl IntoIterator<Item = Verdict>`,
/// including functions whose iterator borrows the resource:
///
/// ```
/// use rescat::hooks::{HookPipeline, Verdict};
/// use rescat::{Resource, ResourceCollection};
///
/// fn tagged(resource: &Resource) -> impl Iterator<Item = Verdict> + '_ {
///     resource
///         .tags()
///         .into_iter()
///         .flat_map(|tags| tags.iter())
///         .map(|tag| Verdict::accept(format!("tagged {}", tag)))
/// }
///
/// let collection = ResourceCollection::new([Resource::new("a").with_tags(["x"])]).unwrap();
/// let report = HookPipeline::new().checker_fn("tagged", tagged).validate(&collection).unwrap();
/// assert!(report.is_success());
/// ```
///
/// Closures need their argument annotated, as in `|r: &Resource| ...`.
pub trait CheckerFn<'a> {
    type Verdicts: Iterator<Item = Verdict> + 'a;

    fn verdicts(&self, resource: &'a Resource) -> Self::Verdicts;
}

impl<'a, F, I> CheckerFn<'a> for F
where
    F: Fn(&'a Resource) -> I,
    I: IntoIterator<Item = Verdict>,
    I::IntoIter: 'a,
{
    type Verdicts = I::IntoIter;

    fn verdicts(&self, resource: &'a Resource) -> I::IntoIter {
        self(resource).into_iter()
    }
}

/// A [`Checker`] backed by a function.
pub struct FnChecker<F> {
    name: String,
    f: F,
}

impl<F> FnChecker<F>
where
    F: for<'a> CheckerFn<'a>,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Checker for FnChecker<F>
where
    F: for<'a> CheckerFn<'a>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn check<'a>(&'a self, resource: &'a Resource) -> Box<dyn Iterator<Item = Verdict> + 'a> {
        Box::new(self.f.verdicts(resource))
    }
}

impl<F> fmt::Debug for FnChecker<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnChecker").field("name", &self.name).finish()
    }
}

struct Transform {
    name: String,
    f: TransformFn,
}

/// Ordered transforms and checkers.
///
/// Hooks run in registration order. Registering the same hook twice runs it
/// twice.
#[derive(Clone, Default)]
pub struct HookPipeline {
    transforms: Vec<Rc<Transform>>,
    checkers: Vec<Rc<dyn Checker>>,
}

impl HookPipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a pipeline from hook file locations, loading every file once.
    pub fn from_config(config: &HookConfig) -> Result<Self> {
        let mut pipeline = Self::new();
        for location in &config.transforms {
            pipeline = pipeline.transform_script(TransformScript::load(location)?);
        }
        for location in &config.checkers {
            pipeline = pipeline.checker(ScriptChecker::load(location)?);
        }
        debug!(
            transforms = pipeline.transforms.len(),
            checkers = pipeline.checkers.len(),
            "hook pipeline built"
        );
        Ok(pipeline)
    }

    /// Returns true if no hooks are registered.
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty() && self.checkers.is_empty()
    }

    pub fn has_checkers(&self) -> bool {
        !self.checkers.is_empty()
    }

    /// Names of the registered checkers, in order.
    pub fn checker_names(&self) -> Vec<String> {
        self.checkers.iter().map(|c| c.name().to_string()).collect()
    }

    /// Adds a transform closure.
    ///
    /// # Example
    ///
    /// ```rust
    /// use rescat::{HookPipeline, Resource, ResourceCollection};
    ///
    /// let hooks = HookPipeline::new().transform_fn("upper", |r| {
    ///     let path = r.get("path")?.as_str().unwrap_or_default().to_uppercase();
    ///     r.set("path", path)?;
    ///     Ok(())
    /// });
    ///
    /// let mut collection =
    ///     ResourceCollection::new([Resource::new("a").with("path", "/x")]).unwrap();
    /// hooks.apply_transforms(&mut collection).unwrap();
    /// assert_eq!(collection.get("a").unwrap()["path"], "/X".into());
    /// ```
    pub fn transform_fn<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Resource) -> Result<()> + 'static,
    {
        self.transforms.push(Rc::new(Transform {
            name: name.into(),
            f: Rc::new(f),
        }));
        self
    }

    /// Adds a transform hook file.
    pub fn transform_script(self, script: TransformScript) -> Self {
        let name = script.name().to_string();
        self.transform_fn(name, move |resource| script.apply(resource))
    }

    /// Adds a checker.
    pub fn checker<C>(mut self, checker: C) -> Self
    where
        C: Checker + 'static,
    {
        self.checkers.push(Rc::new(checker));
        self
    }

    /// Adds a checker closure.
    pub fn checker_fn<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> CheckerFn<'a> + 'static,
    {
        self.checker(FnChecker::new(name, f))
    }

    /// Runs every transform over every resource: all resources through the
    /// first transform, then all through the second, and so on. Stops at the
    /// first failure.
    pub fn apply_transforms(&self, collection: &mut ResourceCollection) -> Result<()> {
        for transform in &self.transforms {
            debug!(hook = %transform.name, resources = collection.len(), "applying transform");
            for resource in collection.iter_mut() {
                (transform.f)(resource)?;
            }
        }
        Ok(())
    }

    /// Runs every checker over every resource.
    ///
    /// Fails only when no checkers are registered; rejected resources are
    /// reported, not raised.
    pub fn validate(&self, collection: &ResourceCollection) -> Result<ValidationReport> {
        if self.checkers.is_empty() {
            return Err(Error::NoCheckers);
        }
        let mut resources = Vec::with_capacity(collection.len());
        for resource in collection {
            let mut findings = Vec::new();
            for (checker_index, checker) in self.checkers.iter().enumerate() {
                for verdict in checker.check(resource) {
                    if !verdict.accepted {
                        warn!(
                            resource = %resource.name(),
                            checker = %checker.name(),
                            message = %verdict.message,
                            "resource rejected"
                        );
                    }
                    findings.push(Finding {
                        checker: checker_index,
                        verdict,
                    });
                }
            }
            resources.push(ResourceReport::new(resource.name(), findings));
        }
        Ok(ValidationReport {
            checkers: self.checker_names(),
            resources,
        })
    }
}

impl fmt::Debug for HookPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookPipeline")
            .field("transform_count", &self.transforms.len())
            .field("checker_count", &self.checkers.len())
            .finish()
    }
}

/// How validation ended for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Accepted by at least one checker and rejected by none.
    Ok,
    /// No checker produced a verdict.
    Unmatched,
    /// At least one checker rejected it.
    Rejected,
}

impl Outcome {
    pub fn is_ok(self) -> bool {
        self == Outcome::Ok
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Ok => "ok",
            Outcome::Unmatched => "unmatched",
            Outcome::Rejected => "rejected",
        })
    }
}

/// A verdict and the position of the checker that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub checker: usize,
    pub verdict: Verdict,
}

/// Validation result for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReport {
    resource: String,
    outcome: Outcome,
    findings: Vec<Finding>,
}

impl ResourceReport {
    fn new(resource: &str, findings: Vec<Finding>) -> Self {
        let outcome = if findings.iter().any(|f| !f.verdict.accepted) {
            Outcome::Rejected
        } else if findings.is_empty() {
            Outcome::Unmatched
        } else {
            Outcome::Ok
        };
        Self {
            resource: resource.to_string(),
            outcome,
            findings,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Rejection messages, in checker order.
    pub fn problems(&self) -> impl Iterator<Item = &str> {
        self.findings
            .iter()
            .filter(|f| !f.verdict.accepted)
            .map(|f| f.verdict.message.as_str())
    }
}

/// Per-checker totals over a validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerSummary {
    pub name: String,
    /// Resources the checker produced at least one verdict for.
    pub checked: usize,
    /// Resources the checker rejected.
    pub rejected: usize,
}

/// Outcome of [`HookPipeline::validate`], one entry per resource in
/// collection order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    checkers: Vec<String>,
    resources: Vec<ResourceReport>,
}

impl ValidationReport {
    /// True when every resource is [`Outcome::Ok`].
    pub fn is_success(&self) -> bool {
        self.resources.iter().all(|r| r.outcome.is_ok())
    }

    pub fn checkers(&self) -> &[String] {
        &self.checkers
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceReport> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn get(&self, resource: &str) -> Option<&ResourceReport> {
        self.resources.iter().find(|r| r.resource == resource)
    }

    /// Resources that did not pass.
    pub fn failures(&self) -> impl Iterator<Item = &ResourceReport> {
        self.resources.iter().filter(|r| !r.outcome.is_ok())
    }

    pub fn checker_summaries(&self) -> Vec<CheckerSummary> {
        self.checkers
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let mut summary = CheckerSummary {
                    name: name.clone(),
                    checked: 0,
                    rejected: 0,
                };
                for report in &self.resources {
                    let own: Vec<_> = report
                        .findings
                        .iter()
                        .filter(|f| f.checker == index)
                        .collect();
                    if !own.is_empty() {
                        summary.checked += 1;
                    }
                    if own.iter().any(|f| !f.verdict.accepted) {
                        summary.rejected += 1;
                    }
                }
                summary
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a ValidationReport {
    type Item = &'a ResourceReport;
    type IntoIter = std::slice::Iter<'a, ResourceReport>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::cell::RefCell;

    fn collection() -> ResourceCollection {
        ResourceCollection::new([
            Resource::new("a").with("v", 1).with("kind", "bam"),
            Resource::new("b").with("v", 2).with("kind", "csv"),
            Resource::new("c").with("v", 3),
        ])
        .unwrap()
    }

    fn kind_checker(resource: &Resource) -> Vec<Verdict> {
        match resource.lookup("kind").and_then(Value::as_str) {
            Some("bam") => vec![Verdict::accept("bam ok")],
            Some(other) => vec![Verdict::reject(format!("unsupported kind {}", other))],
            None => Vec::new(),
        }
    }

    /// One verdict per attribute, borrowing the resource while iterating.
    fn attribute_checker(resource: &Resource) -> impl Iterator<Item = Verdict> + '_ {
        resource
            .attributes()
            .filter(|(key, _)| *key != "kind")
            .map(|(key, value)| match value.as_i64() {
                Some(v) if v < 3 => Verdict::accept(format!("{} ok", key)),
                _ => Verdict::reject(format!("{} too large", key)),
            })
    }

    #[test]
    fn checkers_may_borrow_the_resource() {
        let report = HookPipeline::new()
            .checker_fn("attrs", attribute_checker)
            .validate(&collection())
            .unwrap();
        assert_eq!(report.get("a").unwrap().outcome(), Outcome::Ok);
        assert_eq!(
            report.get("c").unwrap().problems().collect::<Vec<_>>(),
            vec!["v too large"]
        );
    }

    #[test]
    fn empty_pipeline_is_noop() {
        let hooks = HookPipeline::new();
        assert!(hooks.is_empty());
        let mut c = collection();
        hooks.apply_transforms(&mut c).unwrap();
        assert_eq!(c, collection());
    }

    #[test]
    fn transforms_compose_in_order() {
        let hooks = HookPipeline::new()
            .transform_fn("plus_one", |r| {
                let v = r.get("v")?.as_i64().unwrap_or(0);
                r.set("v", v + 1)?;
                Ok(())
            })
            .transform_fn("times_ten", |r| {
                let v = r.get("v")?.as_i64().unwrap_or(0);
                r.set("v", v * 10)?;
                Ok(())
            });
        let mut c = collection();
        hooks.apply_transforms(&mut c).unwrap();
        assert_eq!(c.get("a").unwrap()["v"], Value::from(20));
        assert_eq!(c.get("c").unwrap()["v"], Value::from(40));
    }

    #[test]
    fn each_transform_sees_every_resource_before_the_next() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = log.clone();
        let second = log.clone();
        let hooks = HookPipeline::new()
            .transform_fn("first", move |r| {
                first.borrow_mut().push(format!("1{}", r.name()));
                Ok(())
            })
            .transform_fn("second", move |r| {
                second.borrow_mut().push(format!("2{}", r.name()));
                Ok(())
            });
        hooks.apply_transforms(&mut collection()).unwrap();
        assert_eq!(*log.borrow(), vec!["1a", "1b", "1c", "2a", "2b", "2c"]);
    }

    #[test]
    fn transform_failure_stops_pipeline() {
        let hooks = HookPipeline::new().transform_fn("bad", |r| {
            r.set("name", "renamed")?;
            Ok(())
        });
        assert!(matches!(
            hooks.apply_transforms(&mut collection()),
            Err(Error::ReservedAttribute(_))
        ));
    }

    #[test]
    fn validation_requires_checkers() {
        assert!(matches!(
            HookPipeline::new().validate(&collection()),
            Err(Error::NoCheckers)
        ));
    }

    #[test]
    fn validation_outcomes() {
        let hooks = HookPipeline::new().checker_fn("kind", kind_checker);
        let report = hooks.validate(&collection()).unwrap();
        assert!(!report.is_success());
        assert_eq!(report.get("a").unwrap().outcome(), Outcome::Ok);
        assert_eq!(report.get("b").unwrap().outcome(), Outcome::Rejected);
        assert_eq!(report.get("c").unwrap().outcome(), Outcome::Unmatched);
        assert_eq!(
            report.get("b").unwrap().problems().collect::<Vec<_>>(),
            vec!["unsupported kind csv"]
        );
        let failed: Vec<_> = report.failures().map(|r| r.resource()).collect();
        assert_eq!(failed, vec!["b", "c"]);
    }

    #[test]
    fn one_acceptance_is_enough_but_one_rejection_fails() {
        let hooks = HookPipeline::new()
            .checker_fn("kind", kind_checker)
            .checker_fn("everything", |_: &Resource| [Verdict::accept("fine")]);
        let report = hooks.validate(&collection()).unwrap();
        assert_eq!(report.get("c").unwrap().outcome(), Outcome::Ok);
        assert_eq!(report.get("b").unwrap().outcome(), Outcome::Rejected);

        let summaries = report.checker_summaries();
        assert_eq!(summaries[0].name, "kind");
        assert_eq!((summaries[0].checked, summaries[0].rejected), (2, 1));
        assert_eq!((summaries[1].checked, summaries[1].rejected), (3, 0));
    }

    #[test]
    fn debug_shows_counts() {
        let hooks = HookPipeline::new()
            .transform_fn("t", |_| Ok(()))
            .checker_fn("c", |_: &Resource| None::<Verdict>);
        let debug = format!("{:?}", hooks);
        assert!(debug.contains("transform_count: 1"));
        assert!(debug.contains("checker_count: 1"));
    }

    #[test]
    fn from_config_loads_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let t1 = dir.path().join("t1.toml");
        let t2 = dir.path().join("t2.toml");
        let check = dir.path().join("check.toml");
        std::fs::write(&t1, "[[step]]\nset = \"v\"\nvalue = \"v + 1\"\n").unwrap();
        std::fs::write(&t2, "[[step]]\nset = \"v\"\nvalue = \"v * 10\"\n").unwrap();
        std::fs::write(&check, "name = \"positive\"\n[[rule]]\nrequire = \"v > 0\"\n").unwrap();

        let config = HookConfig::new()
            .transform(t1.display().to_string())
            .transform(t2.display().to_string())
            .checker(check.display().to_string());
        let hooks = HookPipeline::from_config(&config).unwrap();
        assert_eq!(hooks.checker_names(), vec!["positive"]);

        let mut c = collection();
        hooks.apply_transforms(&mut c).unwrap();
        assert_eq!(c.get("b").unwrap()["v"], Value::from(30));
        assert!(hooks.validate(&c).unwrap().is_success());
    }

    #[test]
    fn from_config_reports_missing_files() {
        let config = HookConfig::new().checker("/nonexistent/check.toml");
        assert!(matches!(
            HookPipeline::from_config(&config),
            Err(Error::Fetch { .. })
        ));
    }
}
