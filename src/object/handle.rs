//! Object handles and lifecycle
//!
//! An `Object` is a cheap, clonable handle. Cloning takes a reference and
//! dropping releases one; both are single atomic operations and never touch
//! the object lock. The object is torn down synchronously, on the thread
//! that releases the last reference, and its dispose hook runs right then.

use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::value::Value;

/// Opaque per-subscription user data
pub type Context = Arc<dyn Any + Send + Sync>;

/// Signal handler signature: emitting object, payload, subscription context
pub type SignalFn = dyn Fn(&Object, &Value, Option<&Context>) + Send + Sync;

/// Shared signal handler; identity is the allocation
pub type SignalHandler = Arc<SignalFn>;

/// Command handler signature
pub type CommandFn = dyn Fn(&Object, &mut CommandArgs) + Send + Sync;

/// Shared command handler; identity is the allocation
pub type CommandHandler = Arc<CommandFn>;

type DisposeFn = Box<dyn FnOnce(&str) + Send>;

/// Wrap a closure into a shareable signal handler
pub fn signal_handler<F>(f: F) -> SignalHandler
where
    F: Fn(&Object, &Value, Option<&Context>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure into a shareable command handler
pub fn command_handler<F>(f: F) -> CommandHandler
where
    F: Fn(&Object, &mut CommandArgs) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Arguments and outcome of a command call
#[derive(Debug, Default)]
pub struct CommandArgs {
    /// Positional arguments
    pub args: Vec<Value>,
    /// Return value set by the handler
    pub retval: Option<Value>,
    /// Error set by the handler
    pub error: Option<Error>,
}

impl CommandArgs {
    pub fn new(args: Vec<Value>) -> Self {
        Self {
            args,
            retval: None,
            error: None,
        }
    }

    /// Positional argument, or `InvalidArgument` naming it
    pub fn arg(&self, index: usize, name: &str) -> Result<&Value> {
        self.args
            .get(index)
            .ok_or_else(|| Error::invalid(format!("missing argument {} ({})", index, name)))
    }

    pub fn str_arg(&self, index: usize, name: &str) -> Result<&str> {
        let value = self.arg(index, name)?;
        value
            .as_str()
            .ok_or_else(|| type_error(name, "string", value))
    }

    pub fn int_arg(&self, index: usize, name: &str) -> Result<i64> {
        let value = self.arg(index, name)?;
        value
            .as_int()
            .ok_or_else(|| type_error(name, "int64", value))
    }

    pub fn collection_arg(&self, index: usize, name: &str) -> Result<&Collection> {
        let value = self.arg(index, name)?;
        value
            .as_collection()
            .ok_or_else(|| type_error(name, "collection", value))
    }

    pub fn string_list_arg(&self, index: usize, name: &str) -> Result<Vec<String>> {
        let value = self.arg(index, name)?;
        value
            .string_list()
            .ok_or_else(|| type_error(name, "list of strings", value))
    }

    /// Record the handler outcome
    pub fn finish(&mut self, outcome: Result<Value>) {
        match outcome {
            Ok(value) => self.retval = Some(value),
            Err(e) => self.error = Some(e),
        }
    }

    /// Collapse the outcome; a call nobody answered yields `Value::None`
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.retval.unwrap_or_default()),
        }
    }
}

fn type_error(name: &str, expected: &str, got: &Value) -> Error {
    Error::invalid(format!(
        "argument {} must be a {}, got {}",
        name,
        expected,
        got.type_name()
    ))
}

/// Token identifying one signal subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub(super) signal_id: u32,
    pub(super) token: u64,
}

impl Subscription {
    pub fn signal_id(&self) -> u32 {
        self.signal_id
    }
}

/// One connected (handler, context) pair
#[derive(Clone)]
pub(super) struct HandlerEntry {
    pub(super) token: u64,
    pub(super) handler: SignalHandler,
    pub(super) context: Option<Context>,
}

impl HandlerEntry {
    pub(super) fn matches(&self, handler: &SignalHandler, context: Option<&Context>) -> bool {
        let same_context = match (&self.context, context) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        same_context && Arc::ptr_eq(&self.handler, handler)
    }
}

/// Command and signal tables, guarded by the object lock
#[derive(Default)]
pub(super) struct Tables {
    pub(super) commands: BTreeMap<u32, CommandHandler>,
    /// Per signal, most recent registration first
    pub(super) signals: BTreeMap<u32, VecDeque<HandlerEntry>>,
    pub(super) next_token: u64,
}

pub(super) struct ObjectInner {
    pub(super) name: String,
    pub(super) tables: Mutex<Tables>,
    on_dispose: Mutex<Option<DisposeFn>>,
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        if let Some(dispose) = self.on_dispose.get_mut().take() {
            dispose(&self.name);
        }
        tracing::trace!(object = %self.name, "Object destroyed");
    }
}

/// Addressable, reference-counted entity with a command table and a
/// signal table
#[derive(Clone)]
pub struct Object {
    pub(super) inner: Arc<ObjectInner>,
}

impl Object {
    /// Create an object holding one reference
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                name: name.into(),
                tables: Mutex::new(Tables::default()),
                on_dispose: Mutex::new(None),
            }),
        }
    }

    /// Create an object whose `dispose` hook runs when the last reference
    /// is released
    pub fn with_dispose<F>(name: impl Into<String>, dispose: F) -> Self
    where
        F: FnOnce(&str) + Send + 'static,
    {
        let object = Self::new(name);
        *object.inner.on_dispose.lock() = Some(Box::new(dispose));
        object
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of live references
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Non-owning handle, for handlers that must not keep the object alive
    pub fn downgrade(&self) -> WeakObject {
        WeakObject {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both handles refer to the same object
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("name", &self.inner.name)
            .field("refs", &self.ref_count())
            .finish()
    }
}

/// Weak object handle
#[derive(Clone)]
pub struct WeakObject {
    inner: Weak<ObjectInner>,
}

impl WeakObject {
    /// Take a reference if the object is still alive
    pub fn upgrade(&self) -> Option<Object> {
        self.inner.upgrade().map(|inner| Object { inner })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_created_with_one_reference() {
        let object = Object::new("playback");
        assert_eq!(object.ref_count(), 1);
        assert_eq!(object.name(), "playback");
    }

    #[test]
    fn test_dispose_runs_on_last_release() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&disposed);
        let object = Object::with_dispose("output", move |name| {
            assert_eq!(name, "output");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let second = object.clone();
        assert_eq!(object.ref_count(), 2);

        drop(object);
        assert_eq!(disposed.load(Ordering::SeqCst), 0);

        drop(second);
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_weak_handle() {
        let object = Object::new("medialib");
        let weak = object.downgrade();
        assert!(weak.upgrade().unwrap().ptr_eq(&object));
        drop(object);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_command_args_accessors() {
        let args = CommandArgs::new(vec![Value::from("Favourites"), Value::Int64(3)]);
        assert_eq!(args.str_arg(0, "name").unwrap(), "Favourites");
        assert_eq!(args.int_arg(1, "id").unwrap(), 3);
        assert!(matches!(args.int_arg(0, "name"), Err(Error::InvalidArgument(_))));
        assert!(matches!(args.arg(2, "namespace"), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_command_args_outcome() {
        let mut args = CommandArgs::default();
        args.finish(Ok(Value::Int64(1)));
        assert_eq!(args.into_result().unwrap(), Value::Int64(1));

        let mut args = CommandArgs::default();
        args.finish(Err(Error::NotFound("x".into())));
        assert_eq!(args.into_result(), Err(Error::NotFound("x".into())));

        assert_eq!(CommandArgs::default().into_result().unwrap(), Value::None);
    }
}
