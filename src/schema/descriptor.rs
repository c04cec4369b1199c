//! Path type descriptors.
//!
//! A descriptor is the static record that drives everything the document does
//! with one declared path: how assignments are coerced, how reads are
//! presented, which validators gate a save and how the path contributes to the
//! dirty diff. Descriptors are looked up by path string; nothing is generated.

use crate::core::Result;
use crate::document::{Document, UpdateDescription};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::Schema;

/// A setter or cast-set hook. `Err` is recorded as a coercion failure and the
/// previous value is kept.
pub type SetterFn = Arc<dyn Fn(&mut Document, Value, &str) -> Result<Value> + Send + Sync>;

/// A getter or cast-get hook.
pub type GetterFn = Arc<dyn Fn(&Document, Value, &str) -> Value + Send + Sync>;

/// Init hook; the flag is `true` when the value comes from hydration.
pub type InitFn = Arc<dyn Fn(&mut Document, Value, &str, bool) -> Value + Send + Sync>;

pub type DefaultFn = Arc<dyn Fn(&Document) -> Value + Send + Sync>;

/// Contributes the dirty path to the accumulating update description.
pub type AtomicEncoderFn = Arc<dyn Fn(&mut Document, &str, &mut UpdateDescription) + Send + Sync>;

/// Runs right before validation on every save.
pub type CompilerFn = Arc<dyn Fn(&mut Document, &str) + Send + Sync>;

pub type ValidatorFuture = Pin<Box<dyn Future<Output = Verdict> + Send>>;

pub type ValidatorFn = Arc<dyn Fn(Value) -> ValidatorFuture + Send + Sync>;

/// Outcome reported by a validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub message: Option<String>,
}

impl Verdict {
    pub fn pass() -> Self {
        Self {
            passed: true,
            message: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: Some(message.into()),
        }
    }

    pub fn from_bool(passed: bool) -> Self {
        Self {
            passed,
            message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    String,
    Number,
    Boolean,
    Date,
    ObjectId,
    Array,
    Object,
    Virtual,
    Raw,
    DbRef,
    DbRefArray,
    DbReffedArray,
}

impl PathKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathKind::String => "string",
            PathKind::Number => "number",
            PathKind::Boolean => "boolean",
            PathKind::Date => "date",
            PathKind::ObjectId => "oid",
            PathKind::Array => "array",
            PathKind::Object => "object",
            PathKind::Virtual => "virtual",
            PathKind::Raw => "raw",
            PathKind::DbRef => "dbref",
            PathKind::DbRefArray => "dbrefArray",
            PathKind::DbReffedArray => "dbreffedArray",
        }
    }
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Computed(DefaultFn),
}

/// Member type of a collection-valued path.
#[derive(Clone)]
pub enum Subtype {
    /// Members are embedded documents of this schema (not separately persisted).
    Embedded(Arc<Schema>),
    /// Members are persisted documents of the named model.
    Model(String),
    /// Members are scalars coerced through this descriptor's setter chain.
    Scalar(Arc<PathDescriptor>),
}

#[derive(Clone)]
pub struct PathDescriptor {
    pub kind: PathKind,
    pub setters: Vec<SetterFn>,
    pub strict_setter: Option<SetterFn>,
    pub getters: Vec<GetterFn>,
    pub init_hook: Option<InitFn>,
    pub cast_get: Option<GetterFn>,
    pub cast_set: Option<SetterFn>,
    pub default: Option<DefaultValue>,
    pub validators: Vec<(String, ValidatorFn)>,
    pub atomic: bool,
    pub atomic_encoder: Option<AtomicEncoderFn>,
    pub compiler: Option<CompilerFn>,
    pub subtype: Option<Subtype>,
    /// Back-reference field on the foreign side of an inverse reference array.
    pub referred_as: Option<String>,
}

impl fmt::Debug for PathDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathDescriptor")
            .field("kind", &self.kind)
            .field("setters", &self.setters.len())
            .field("getters", &self.getters.len())
            .field("has_default", &self.default.is_some())
            .field(
                "validators",
                &self.validators.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field("atomic", &self.atomic)
            .field("has_compiler", &self.compiler.is_some())
            .finish()
    }
}

impl PathDescriptor {
    pub fn new(kind: PathKind) -> Self {
        Self {
            kind,
            setters: Vec::new(),
            strict_setter: None,
            getters: Vec::new(),
            init_hook: None,
            cast_get: None,
            cast_set: None,
            default: None,
            validators: Vec::new(),
            atomic: false,
            atomic_encoder: None,
            compiler: None,
            subtype: None,
            referred_as: None,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn is_virtual(&self) -> bool {
        self.kind == PathKind::Virtual
    }

    /// Registers a setter. Setters run last-registered first.
    pub fn set<F>(mut self, setter: F) -> Self
    where
        F: Fn(&mut Document, Value, &str) -> Result<Value> + Send + Sync + 'static,
    {
        self.setters.push(Arc::new(setter));
        self
    }

    /// Registers a getter. Getters run in registration order.
    pub fn get<F>(mut self, getter: F) -> Self
    where
        F: Fn(&Document, Value, &str) -> Value + Send + Sync + 'static,
    {
        self.getters.push(Arc::new(getter));
        self
    }

    pub fn strict<F>(mut self, setter: F) -> Self
    where
        F: Fn(&mut Document, Value, &str) -> Result<Value> + Send + Sync + 'static,
    {
        self.strict_setter = Some(Arc::new(setter));
        self
    }

    pub fn init<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Document, Value, &str, bool) -> Value + Send + Sync + 'static,
    {
        self.init_hook = Some(Arc::new(hook));
        self
    }

    pub fn cast_get<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Document, Value, &str) -> Value + Send + Sync + 'static,
    {
        self.cast_get = Some(Arc::new(hook));
        self
    }

    pub fn cast_set<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Document, Value, &str) -> Result<Value> + Send + Sync + 'static,
    {
        self.cast_set = Some(Arc::new(hook));
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn default_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Document) -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Computed(Arc::new(f)));
        self
    }

    /// Registers an asynchronous validator under `name`. A later registration
    /// with the same name replaces the earlier one.
    pub fn validate<F, Fut>(mut self, name: impl Into<String>, validator: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Verdict> + Send + 'static,
    {
        let name = name.into();
        let validator: ValidatorFn =
            Arc::new(move |value| -> ValidatorFuture { Box::pin(validator(value)) });
        self.validators.retain(|(existing, _)| existing != &name);
        self.validators.push((name, validator));
        self
    }

    pub fn validate_sync<F>(self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        let check = Arc::new(check);
        self.validate(name, move |value| {
            let check = check.clone();
            async move { Verdict::from_bool(check(&value)) }
        })
    }

    pub fn atomic_encoder<F>(mut self, encoder: F) -> Self
    where
        F: Fn(&mut Document, &str, &mut UpdateDescription) + Send + Sync + 'static,
    {
        self.atomic = true;
        self.atomic_encoder = Some(Arc::new(encoder));
        self
    }

    pub fn compile<F>(mut self, compiler: F) -> Self
    where
        F: Fn(&mut Document, &str) + Send + Sync + 'static,
    {
        self.compiler = Some(Arc::new(compiler));
        self
    }

    pub fn subtype(mut self, subtype: Subtype) -> Self {
        self.subtype = Some(subtype);
        self
    }

    pub fn referred_as(mut self, field: impl Into<String>) -> Self {
        self.referred_as = Some(field.into());
        self
    }

    /// Name of the model this path references, if any.
    pub fn model_name(&self) -> Option<&str> {
        match &self.subtype {
            Some(Subtype::Model(name)) => Some(name),
            _ => None,
        }
    }
}
