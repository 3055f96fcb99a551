//! Lexical environments
//!
//! A scope holds `let`/`const` bindings and points at its enclosing scope.
//! A binding whose value is `None` is in its temporal dead zone. Names that
//! resolve nowhere in the chain fall back to the global object.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::JsError;
use crate::prelude::FxHashMap;
use crate::string::JsString;
use crate::value::{CheapClone, JsValue, PropertyKey};

use super::Interpreter;

/// Shared handle to a scope
pub type EnvRef = Rc<RefCell<Scope>>;

/// A variable binding
#[derive(Debug, Clone)]
pub struct Binding {
    /// `None` until initialized
    pub value: Option<JsValue>,
    pub mutable: bool,
}

#[derive(Debug, Default)]
pub struct Scope {
    pub bindings: FxHashMap<JsString, Binding>,
    pub outer: Option<EnvRef>,
}

/// Allocate a new scope with the given outer scope
pub fn new_scope(outer: Option<EnvRef>) -> EnvRef {
    Rc::new(RefCell::new(Scope {
        bindings: FxHashMap::default(),
        outer,
    }))
}

/// Declare an uninitialized binding in `env` itself
pub fn declare(env: &EnvRef, name: JsString, mutable: bool) {
    env.borrow_mut().bindings.insert(
        name,
        Binding {
            value: None,
            mutable,
        },
    );
}

/// Declare and initialize a binding in `env` itself
pub fn define(env: &EnvRef, name: JsString, value: JsValue, mutable: bool) {
    env.borrow_mut().bindings.insert(
        name,
        Binding {
            value: Some(value),
            mutable,
        },
    );
}

/// Initialize a binding declared in `env`. Undeclared names are created as
/// mutable bindings.
pub fn initialize(env: &EnvRef, name: &JsString, value: JsValue) {
    let mut scope = env.borrow_mut();
    match scope.bindings.get_mut(name) {
        Some(binding) => binding.value = Some(value),
        None => {
            scope.bindings.insert(
                name.cheap_clone(),
                Binding {
                    value: Some(value),
                    mutable: true,
                },
            );
        }
    }
}

fn tdz_error(name: &JsString) -> JsError {
    JsError::uninitialized(name)
}

/// Look a name up through the chain. `Ok(None)` means unresolved.
pub fn lookup(env: &EnvRef, name: &JsString) -> Result<Option<JsValue>, JsError> {
    let mut current = Some(env.cheap_clone());
    while let Some(scope_ref) = current.take() {
        let scope = scope_ref.borrow();
        if let Some(binding) = scope.bindings.get(name) {
            return match &binding.value {
                Some(value) => Ok(Some(value.clone())),
                None => Err(tdz_error(name)),
            };
        }
        current = scope.outer.as_ref().map(|o| o.cheap_clone());
    }
    Ok(None)
}

/// Assign through the chain. `Ok(false)` means unresolved.
pub fn assign(env: &EnvRef, name: &JsString, value: JsValue) -> Result<bool, JsError> {
    let mut current = Some(env.cheap_clone());
    while let Some(scope_ref) = current.take() {
        let mut scope = scope_ref.borrow_mut();
        if let Some(binding) = scope.bindings.get_mut(name) {
            if binding.value.is_none() {
                return Err(tdz_error(name));
            }
            if !binding.mutable {
                return Err(JsError::type_error(format!(
                    "Assignment to constant variable '{}'",
                    name
                )));
            }
            binding.value = Some(value);
            return Ok(true);
        }
        current = scope.outer.as_ref().map(|o| o.cheap_clone());
    }
    Ok(false)
}

impl Interpreter {
    /// Resolve a name, falling back to the global object
    pub fn env_get(&mut self, env: &EnvRef, name: &JsString) -> Result<JsValue, JsError> {
        if let Some(value) = lookup(env, name)? {
            return Ok(value);
        }
        let key = PropertyKey::from(name.cheap_clone());
        let global = self.global.cheap_clone();
        if self.has_property(&global, &key)? {
            return self.get_property(&global, &key);
        }
        Err(JsError::reference_error(name.to_rust_string_lossy()))
    }

    /// Assign a name, falling back to the global object. Strict code may
    /// not create new globals by assignment.
    pub fn env_set(
        &mut self,
        env: &EnvRef,
        name: &JsString,
        value: JsValue,
        strict: bool,
    ) -> Result<(), JsError> {
        if assign(env, name, value.clone())? {
            return Ok(());
        }
        let key = PropertyKey::from(name.cheap_clone());
        let global = self.global.cheap_clone();
        if strict && !self.has_property(&global, &key)? {
            return Err(JsError::reference_error(name.to_rust_string_lossy()));
        }
        self.put(&global, key, value, strict)?;
        Ok(())
    }

    /// Define a global lexical binding
    pub fn define_global(&mut self, name: &str, value: JsValue, mutable: bool) -> Result<(), JsError> {
        self.check_realm(&value)?;
        define(&self.global_env, JsString::from(name), value, mutable);
        Ok(())
    }
}
