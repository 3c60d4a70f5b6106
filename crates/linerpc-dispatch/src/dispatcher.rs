//! Command registry and overload resolution.
//!
//! A command name maps to one or more bindings, each naming a member of a
//! bound object. Every method with that member name is a candidate, so
//! overloads come from two sources: several methods of the same name on
//! one object, and several bindings under one command.
//!
//! Resolution never guesses. Candidates are filtered by arity, then by
//! [`Marshaler::matches`] on every argument; zero or several survivors
//! are both a signature mismatch.

use std::collections::BTreeMap;
use std::sync::Arc;

use linerpc_protocol::Value;
use parking_lot::RwLock;

use crate::object::bare_name;
use crate::{BoundObject, DispatchError, Marshaler, Method};

/// Links a command name to a member of a bound object.
#[derive(Debug, Clone)]
struct CommandBinding {
    object: Arc<BoundObject>,
    member: String,
}

/// Registry of commands. Shared by reference across invocation threads.
#[derive(Debug)]
pub struct CommandDispatcher {
    bindings: RwLock<BTreeMap<String, Vec<CommandBinding>>>,
    marshaler: Arc<Marshaler>,
}

impl CommandDispatcher {
    pub fn new(marshaler: Marshaler) -> Self {
        Self::with_shared_marshaler(Arc::new(marshaler))
    }

    pub fn with_shared_marshaler(marshaler: Arc<Marshaler>) -> Self {
        Self {
            bindings: RwLock::new(BTreeMap::new()),
            marshaler,
        }
    }

    pub fn marshaler(&self) -> &Arc<Marshaler> {
        &self.marshaler
    }

    /// Binds `command` to `member` of `object`.
    ///
    /// `member` may carry an overload signature (`add(integer,integer)`);
    /// it is stripped, so every overload of the bare name becomes a
    /// candidate. Whether the member exists is checked at dispatch time.
    pub fn register(&self, command: impl Into<String>, object: &Arc<BoundObject>, member: &str) {
        let command = command.into();
        let member = bare_name(member).to_string();
        tracing::debug!(%command, object = %object, %member, "command registered");
        self.bindings
            .write()
            .entry(command)
            .or_default()
            .push(CommandBinding {
                object: Arc::clone(object),
                member,
            });
    }

    /// Binds every method of `object` under its own name. Overloads are
    /// bound once.
    pub fn register_all(&self, object: &Arc<BoundObject>) {
        let mut names: Vec<&str> = object.interface().methods().iter().map(Method::name).collect();
        names.sort_unstable();
        names.dedup();
        for name in names {
            self.register(name, object, name);
        }
    }

    /// Removes every binding under `command`. Returns whether any existed.
    pub fn unregister(&self, command: &str) -> bool {
        self.bindings.write().remove(command).is_some()
    }

    /// Picks the single method that `command` with `args` should run.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::CommandNotFound`] if nothing is bound under
    ///   `command`, or the bound members have no methods.
    /// - [`DispatchError::SignatureMismatch`] if no candidate accepts the
    ///   arguments, or more than one does.
    pub fn resolve(&self, command: &str, args: &[Value]) -> Result<ResolvedCall, DispatchError> {
        let not_found = || DispatchError::CommandNotFound(command.to_string());
        let mismatch = || DispatchError::SignatureMismatch(command.to_string());

        let candidates: Vec<Method> = {
            let bindings = self.bindings.read();
            let bound = bindings.get(command).ok_or_else(not_found)?;
            bound
                .iter()
                .flat_map(|b| b.object.interface().methods_named(&b.member).cloned())
                .collect()
        };
        if candidates.is_empty() {
            return Err(not_found());
        }

        let mut matching = candidates
            .into_iter()
            .filter(|m| m.arity() == args.len())
            .filter(|m| {
                m.params()
                    .iter()
                    .zip(args)
                    .all(|(desc, arg)| self.marshaler.matches(desc, arg))
            });

        let method = matching.next().ok_or_else(mismatch)?;
        if let Some(other) = matching.next() {
            tracing::warn!(
                %command,
                first = %method.signature(),
                second = %other.signature(),
                "ambiguous call, refusing to pick an overload"
            );
            return Err(mismatch());
        }

        Ok(ResolvedCall {
            command: command.to_string(),
            method,
            marshaler: Arc::clone(&self.marshaler),
        })
    }

    /// Resolves and invokes in one step.
    pub fn dispatch(&self, command: &str, args: Vec<Value>) -> Result<Value, DispatchError> {
        self.resolve(command, &args)?.invoke(args)
    }

    /// Registered command names, sorted.
    pub fn commands(&self) -> Vec<String> {
        self.bindings.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }
}

/// The outcome of resolution: exactly one method, ready to run.
#[derive(Debug)]
pub struct ResolvedCall {
    command: String,
    method: Method,
    marshaler: Arc<Marshaler>,
}

impl ResolvedCall {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Marshals `args`, runs the method and marshals its return value.
    pub fn invoke(self, args: Vec<Value>) -> Result<Value, DispatchError> {
        let raw = self.method.invoke(args, &self.marshaler)?;
        let value = self.marshaler.from_native(self.method.returns(), raw)?;
        Ok(value)
    }
}
