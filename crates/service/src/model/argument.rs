//! Argument: the payload attached to a Call Record. Exactly one of five
//! variants is populated; the four resource-bearing variants carry an id
//! that is minted by the registrar if the caller passed `None`.

use serde_json::Value;
use uuid::Uuid;

/// Wire-level variant tag for an argument, mirroring `ARPCArgType` in the
/// source: the resource kinds plus, for `Basic`, the shape of the JSON
/// value it wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    BasicBool,
    BasicNumber,
    BasicString,
    BasicArray,
    BasicObject,
    Buffer,
    Transmission,
    ListeningSocket,
    ConnectedSocket,
}

impl ArgKind {
    fn of_basic(value: &Value) -> ArgKind {
        match value {
            Value::Bool(_) => ArgKind::BasicBool,
            Value::Number(_) => ArgKind::BasicNumber,
            Value::String(_) => ArgKind::BasicString,
            Value::Array(_) => ArgKind::BasicArray,
            // Null folds into Object; there is no standalone BasicNull
            // variant in the wire vocabulary.
            Value::Object(_) | Value::Null => ArgKind::BasicObject,
        }
    }
}

/// The value carried by an [`Argument`]. Exactly one variant is populated;
/// Rust's sum type makes the "exactly one" invariant structural rather
/// than something that needs runtime checking.
#[derive(Debug, Clone)]
pub enum ArgValue {
    Basic(Value),
    Buffer { id: Option<Uuid>, payload: Option<Value> },
    Transmission { id: Option<Uuid>, payload: Option<Value> },
    ListeningSocket { id: Option<Uuid>, payload: Option<Value> },
    ConnectedSocket { id: Option<Uuid>, payload: Option<Value> },
}

impl ArgValue {
    pub fn kind(&self) -> ArgKind {
        match self {
            ArgValue::Basic(v) => ArgKind::of_basic(v),
            ArgValue::Buffer { .. } => ArgKind::Buffer,
            ArgValue::Transmission { .. } => ArgKind::Transmission,
            ArgValue::ListeningSocket { .. } => ArgKind::ListeningSocket,
            ArgValue::ConnectedSocket { .. } => ArgKind::ConnectedSocket,
        }
    }

    /// The resource id carried by a non-`Basic` variant, if any.
    pub fn resource_id(&self) -> Option<Uuid> {
        match self {
            ArgValue::Basic(_) => None,
            ArgValue::Buffer { id, .. }
            | ArgValue::Transmission { id, .. }
            | ArgValue::ListeningSocket { id, .. }
            | ArgValue::ConnectedSocket { id, .. } => *id,
        }
    }

    /// Replace this variant's resource id, leaving payload and kind
    /// untouched. No-op on `Basic`.
    fn with_resource_id(self, new_id: Option<Uuid>) -> Self {
        match self {
            ArgValue::Basic(v) => ArgValue::Basic(v),
            ArgValue::Buffer { payload, .. } => ArgValue::Buffer { id: new_id, payload },
            ArgValue::Transmission { payload, .. } => {
                ArgValue::Transmission { id: new_id, payload }
            }
            ArgValue::ListeningSocket { payload, .. } => {
                ArgValue::ListeningSocket { id: new_id, payload }
            }
            ArgValue::ConnectedSocket { payload, .. } => {
                ArgValue::ConnectedSocket { id: new_id, payload }
            }
        }
    }
}

/// A single call argument. An empty `name` means the argument is
/// positional.
#[derive(Debug, Clone)]
pub struct Argument {
    pub name: String,
    pub value: ArgValue,
}

impl Argument {
    pub fn positional(value: ArgValue) -> Self {
        Self {
            name: String::new(),
            value,
        }
    }

    pub fn named(name: impl Into<String>, value: ArgValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn is_positional(&self) -> bool {
        self.name.is_empty()
    }

    /// Strip this argument's server-minted resource id, replacing it with
    /// `None`. Used before an argument list is echoed back out in a
    /// context where the id must not leak (see [`ArgList::nullify_ids`]).
    pub fn nullify_ids(&mut self) {
        let value = std::mem::replace(&mut self.value, ArgValue::Basic(Value::Null));
        self.value = value.with_resource_id(None);
    }
}

/// An ordered list of [`Argument`]s, as carried by a Call Record.
#[derive(Debug, Clone, Default)]
pub struct ArgList(pub Vec<Argument>);

impl ArgList {
    pub fn new(args: Vec<Argument>) -> Self {
        Self(args)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Argument> {
        self.0.get(index)
    }

    /// Strip every argument's resource id in place.
    ///
    /// # Test
    ///
    /// ```
    /// use arpc_core::model::argument::{ArgList, ArgValue, Argument};
    /// use uuid::Uuid;
    ///
    /// let mut args = ArgList::new(vec![Argument::positional(ArgValue::Buffer {
    ///     id: Some(Uuid::new_v4()),
    ///     payload: None,
    /// })]);
    ///
    /// args.nullify_ids();
    /// assert_eq!(args.get(0).unwrap().value.resource_id(), None);
    /// ```
    pub fn nullify_ids(&mut self) {
        for arg in &mut self.0 {
            arg.nullify_ids();
        }
    }
}

/// Wire-facing summary of a single argument, as returned by
/// `CallGetArgValue`.
#[derive(Debug, Clone)]
pub struct ArgInfo {
    pub name: String,
    pub kind: ArgKind,
    pub id: Option<Uuid>,
    pub value: Value,
}

impl From<&Argument> for ArgInfo {
    fn from(arg: &Argument) -> Self {
        let (id, value) = match &arg.value {
            ArgValue::Basic(v) => (None, v.clone()),
            ArgValue::Buffer { id, payload }
            | ArgValue::Transmission { id, payload }
            | ArgValue::ListeningSocket { id, payload }
            | ArgValue::ConnectedSocket { id, payload } => {
                (*id, payload.clone().unwrap_or(Value::Null))
            }
        };

        ArgInfo {
            name: arg.name.clone(),
            kind: arg.value.kind(),
            id,
            value,
        }
    }
}
