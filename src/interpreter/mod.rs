//! The engine instance
//!
//! `Interpreter` owns everything one engine instance needs: the intrinsic
//! prototypes, the global object and scope, the symbol registry, the job
//! queue, the weak-collection registry and the diagnostic call stack. The
//! object model, conversions, the VM and the coroutine machinery are split
//! into submodules that each add `impl Interpreter` blocks.

pub mod bytecode_vm;
pub mod collections;
pub mod convert;
pub mod coroutine;
pub(crate) mod cycles;
pub mod environment;
pub mod intrinsics;
pub mod promise;
pub mod properties;
pub mod proxy;

use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::compiler::{BytecodeChunk, FunctionKind, FunctionTemplate};
use crate::config::EngineConfig;
use crate::error::{JsError, StackFrame};
use crate::object::{
    ExoticObject, FinalizationQueue, JsFunction, JsObject, JsObjectRef, NativeFn, NativeFunction,
    Property, WeakObjectRef,
};
use crate::prelude::FxHashMap;
use crate::string::JsString;
use crate::value::{CheapClone, JsSymbol, JsValue, PropertyKey, WellKnownSymbol};

use bytecode_vm::BytecodeVM;
use environment::EnvRef;
use promise::Job;

static NEXT_REALM_ID: AtomicU32 = AtomicU32::new(1);

/// Cloneable, thread-safe handle that stops a running script
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    /// Request an interrupt. The flag stays set until cleared.
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One entry of the diagnostic call stack
#[derive(Clone)]
pub(crate) struct CallSite {
    pub function_name: String,
    /// `None` for native functions
    pub chunk: Option<Rc<BytecodeChunk>>,
    /// Next instruction; kept current by the VM whenever it leaves its loop
    pub ip: usize,
}

/// The main interpreter
pub struct Interpreter {
    config: EngineConfig,
    realm_id: u32,

    /// Global object
    pub global: JsObjectRef,
    /// Global lexical scope
    pub global_env: EnvRef,

    pub object_prototype: JsObjectRef,
    pub function_prototype: JsObjectRef,
    pub array_prototype: JsObjectRef,
    pub error_prototype: JsObjectRef,
    pub type_error_prototype: JsObjectRef,
    pub range_error_prototype: JsObjectRef,
    pub reference_error_prototype: JsObjectRef,
    pub syntax_error_prototype: JsObjectRef,
    pub uri_error_prototype: JsObjectRef,
    pub boolean_prototype: JsObjectRef,
    pub number_prototype: JsObjectRef,
    pub string_prototype: JsObjectRef,
    pub symbol_prototype: JsObjectRef,
    pub generator_prototype: JsObjectRef,
    pub promise_prototype: JsObjectRef,
    pub map_prototype: JsObjectRef,
    pub set_prototype: JsObjectRef,
    pub weakmap_prototype: JsObjectRef,
    pub weakset_prototype: JsObjectRef,

    /// `Symbol.for` registry
    symbol_registry: FxHashMap<JsString, JsSymbol>,
    /// Well-known symbols, created on first use
    well_known: FxHashMap<WellKnownSymbol, JsSymbol>,

    /// Diagnostic call stack (innermost last); its length is the call depth
    pub(crate) call_stack: Vec<CallSite>,
    /// Nesting of public entry points (execute, call_function, ...)
    entry_depth: usize,

    /// Pending promise jobs, FIFO
    pub(crate) jobs: VecDeque<Job>,

    /// Live WeakMap/WeakSet objects
    weak_collections: Vec<WeakObjectRef>,
    finalization: FinalizationQueue,

    interrupt: InterruptHandle,
    deadline: Option<Instant>,
    ticks: u64,

    /// Every object this instance allocated; used to break reference
    /// cycles on teardown
    allocations: Vec<WeakObjectRef>,
    compact_threshold: usize,
    allocated_since_collection: usize,
    /// Set by `checkpoint` to force a cycle collection
    collection_requested: bool,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let realm_id = NEXT_REALM_ID.fetch_add(1, Ordering::Relaxed);
        let make = |class: &'static str, proto: Option<&JsObjectRef>| {
            JsObjectRef::new(
                realm_id,
                JsObject::new(class, proto.map(|p| p.cheap_clone()), ExoticObject::Ordinary),
            )
        };

        let object_prototype = make("Object", None);
        let root = Some(&object_prototype);
        let function_prototype = make("Function", root);
        let array_prototype = JsObjectRef::new(
            realm_id,
            JsObject::new(
                "Array",
                Some(object_prototype.cheap_clone()),
                ExoticObject::Array {
                    length: 0,
                    length_writable: true,
                },
            ),
        );
        let error_prototype = make("Error", root);
        let type_error_prototype = make("Error", Some(&error_prototype));
        let range_error_prototype = make("Error", Some(&error_prototype));
        let reference_error_prototype = make("Error", Some(&error_prototype));
        let syntax_error_prototype = make("Error", Some(&error_prototype));
        let uri_error_prototype = make("Error", Some(&error_prototype));
        let boolean_prototype = make("Boolean", root);
        let number_prototype = make("Number", root);
        let string_prototype = make("String", root);
        let symbol_prototype = make("Symbol", root);
        let generator_prototype = make("Generator", root);
        let promise_prototype = make("Promise", root);
        let map_prototype = make("Map", root);
        let set_prototype = make("Set", root);
        let weakmap_prototype = make("WeakMap", root);
        let weakset_prototype = make("WeakSet", root);
        let global = make("global", root);

        let intrinsics = [
            &object_prototype,
            &function_prototype,
            &array_prototype,
            &error_prototype,
            &type_error_prototype,
            &range_error_prototype,
            &reference_error_prototype,
            &syntax_error_prototype,
            &uri_error_prototype,
            &boolean_prototype,
            &number_prototype,
            &string_prototype,
            &symbol_prototype,
            &generator_prototype,
            &promise_prototype,
            &map_prototype,
            &set_prototype,
            &weakmap_prototype,
            &weakset_prototype,
            &global,
        ];
        let allocations: Vec<WeakObjectRef> = intrinsics.iter().map(|o| o.downgrade()).collect();

        let mut interp = Self {
            config: config.normalized(),
            realm_id,
            global,
            global_env: environment::new_scope(None),
            object_prototype,
            function_prototype,
            array_prototype,
            error_prototype,
            type_error_prototype,
            range_error_prototype,
            reference_error_prototype,
            syntax_error_prototype,
            uri_error_prototype,
            boolean_prototype,
            number_prototype,
            string_prototype,
            symbol_prototype,
            generator_prototype,
            promise_prototype,
            map_prototype,
            set_prototype,
            weakmap_prototype,
            weakset_prototype,
            symbol_registry: FxHashMap::default(),
            well_known: FxHashMap::default(),
            call_stack: Vec::new(),
            entry_depth: 0,
            jobs: VecDeque::new(),
            weak_collections: Vec::new(),
            finalization: FinalizationQueue::new(),
            interrupt: InterruptHandle::default(),
            deadline: None,
            ticks: 0,
            allocations,
            compact_threshold: 1024,
            allocated_since_collection: 0,
            collection_requested: false,
        };
        intrinsics::init(&mut interp);
        interp
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Set the execution timeout in milliseconds
    ///
    /// Default is 3000ms (3 seconds). Set to 0 to disable timeout.
    pub fn set_timeout_ms(&mut self, timeout_ms: u64) {
        self.config.timeout_ms = timeout_ms;
    }

    /// Id stamped on every object this instance allocates
    pub fn realm_id(&self) -> u32 {
        self.realm_id
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Interrupts and checkpoints
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn clear_interrupt(&self) {
        self.interrupt.clear();
    }

    /// Fail with `Interrupted` if the host asked to stop or the deadline passed
    pub(crate) fn check_interrupt(&self) -> Result<(), JsError> {
        if self.interrupt.is_interrupted() {
            tracing::warn!("script interrupted by host");
            return Err(JsError::interrupted("interrupted by host"));
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            tracing::warn!(timeout_ms = self.config.timeout_ms, "script timed out");
            return Err(JsError::interrupted(format!(
                "Execution timeout after {}ms",
                self.config.timeout_ms
            )));
        }
        Ok(())
    }

    /// Called by the VM once per instruction
    #[inline]
    pub(crate) fn tick(&mut self) -> Result<(), JsError> {
        self.ticks = self.ticks.wrapping_add(1);
        if self.ticks % u64::from(self.config.interrupt_check_interval) == 0 {
            self.check_interrupt()?;
        }
        let sweep = u64::from(self.config.weak_sweep_interval);
        if sweep > 0 && self.ticks % sweep == 0 {
            self.sweep_weak_collections();
        }
        Ok(())
    }

    /// Run `f` as a public entry point. The outermost entry arms the
    /// timeout, and on the way out drains the job queue and sweeps weak
    /// collections.
    pub(crate) fn enter<T, F>(&mut self, f: F) -> Result<T, JsError>
    where
        F: FnOnce(&mut Self) -> Result<T, JsError>,
    {
        let outermost = self.entry_depth == 0;
        if outermost {
            self.deadline = match self.config.timeout_ms {
                0 => None,
                ms => Some(Instant::now() + Duration::from_millis(ms)),
            };
        }
        self.entry_depth += 1;
        let stack_depth = self.call_stack.len();

        let mut result = f(self);
        self.call_stack.truncate(stack_depth);

        if outermost && result.as_ref().err().is_none_or(JsError::is_catchable) {
            let drained = self.drain_jobs();
            let threshold = self.config.cycle_collection_threshold;
            if self.collection_requested || (threshold > 0 && self.allocated_since_collection >= threshold) {
                self.collect_unreachable();
            }
            self.collection_requested = false;
            self.sweep_weak_collections();
            if let Err(e) = drained
                && result.is_ok()
            {
                result = Err(e);
            }
        }

        self.entry_depth -= 1;
        if outermost {
            self.deadline = None;
        }
        result
    }

    /// Drain the job queue, collect reference cycles and sweep weak
    /// collections
    pub fn checkpoint(&mut self) -> Result<(), JsError> {
        if self.entry_depth == 0 {
            self.collection_requested = true;
        }
        self.enter(|_| Ok(()))
    }

    /// Run pending promise jobs until the queue is empty
    pub fn run_jobs(&mut self) -> Result<(), JsError> {
        self.enter(|interp| interp.drain_jobs().map(|_| JsValue::Undefined))
            .map(drop)
    }

    /// Remove dead keys from every weak collection. Returns the number of
    /// entries removed.
    pub fn sweep_weak_collections(&mut self) -> usize {
        let finalized = self.finalization.drain();
        self.weak_collections.retain(WeakObjectRef::is_alive);
        let mut removed = 0;
        for weak in &self.weak_collections {
            let Some(collection) = weak.upgrade() else {
                continue;
            };
            let mut obj = collection.borrow_mut();
            match &mut obj.exotic {
                ExoticObject::WeakMap(table) | ExoticObject::WeakSet(table) => {
                    removed += table.sweep(&finalized);
                }
                _ => {}
            }
        }
        tracing::trace!(
            removed,
            finalized = finalized.len(),
            collections = self.weak_collections.len(),
            "weak collections swept"
        );
        removed
    }

    pub(crate) fn register_weak_collection(&mut self, obj: &JsObjectRef) {
        self.weak_collections.push(obj.downgrade());
    }

    pub(crate) fn finalization_queue(&self) -> &FinalizationQueue {
        &self.finalization
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Instance isolation
    // ═══════════════════════════════════════════════════════════════════════════

    /// Reject objects allocated by another engine instance
    pub fn check_realm(&self, value: &JsValue) -> Result<(), JsError> {
        match value {
            JsValue::Object(obj) => self.check_object_realm(obj),
            _ => Ok(()),
        }
    }

    pub(crate) fn check_object_realm(&self, obj: &JsObjectRef) -> Result<(), JsError> {
        if obj.realm() != self.realm_id {
            return Err(JsError::type_error(
                "Value belongs to a different engine instance",
            ));
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Allocation
    // ═══════════════════════════════════════════════════════════════════════════

    /// Allocate an object owned by this instance
    pub fn alloc(&mut self, object: JsObject) -> JsObjectRef {
        let obj = JsObjectRef::new(self.realm_id, object);
        if self.allocations.len() >= self.compact_threshold {
            self.allocations.retain(WeakObjectRef::is_alive);
            self.compact_threshold = (self.allocations.len() * 2).max(1024);
        }
        self.allocations.push(obj.downgrade());
        self.allocated_since_collection += 1;
        obj
    }

    /// Create a plain object inheriting from `Object.prototype`
    pub fn create_object(&mut self) -> JsObjectRef {
        let proto = self.object_prototype.cheap_clone();
        self.alloc(JsObject::ordinary(Some(proto)))
    }

    pub fn create_object_with_proto(&mut self, prototype: Option<JsObjectRef>) -> JsObjectRef {
        self.alloc(JsObject::ordinary(prototype))
    }

    /// Create an array from a list of values
    pub fn create_array(&mut self, elements: Vec<JsValue>) -> JsObjectRef {
        let length = u32::try_from(elements.len()).unwrap_or(u32::MAX);
        let mut object = JsObject::new(
            "Array",
            Some(self.array_prototype.cheap_clone()),
            ExoticObject::Array {
                length,
                length_writable: true,
            },
        );
        for (i, value) in (0u32..).zip(elements) {
            object.set_property(PropertyKey::Index(i), value);
        }
        self.alloc(object)
    }

    /// Create a function object with `name`, `length` and (for constructors
    /// and generators) a fresh `prototype`
    pub fn create_function(&mut self, func: JsFunction) -> JsObjectRef {
        let (name, length, prototype_parent) = match &func {
            JsFunction::Bytecode(f) => {
                let parent = match f.template.kind {
                    FunctionKind::Normal => Some(self.object_prototype.cheap_clone()),
                    FunctionKind::Generator => Some(self.generator_prototype.cheap_clone()),
                    FunctionKind::Arrow | FunctionKind::Async => None,
                };
                (
                    f.template.name.clone().unwrap_or_else(JsString::empty),
                    u32::from(f.template.param_count),
                    parent,
                )
            }
            JsFunction::Native(f) => (f.name.cheap_clone(), f.arity, None),
            JsFunction::Bound(_) => (JsString::from("bound"), 0, None),
        };
        let is_generator = matches!(
            &func,
            JsFunction::Bytecode(f) if f.template.kind == FunctionKind::Generator
        );

        let proto = self.function_prototype.cheap_clone();
        let mut object = JsObject::new("Function", Some(proto), ExoticObject::Function(func));
        object.define_property(
            "name",
            Property::with_attributes(JsValue::String(name), false, false, true),
        );
        object.define_property(
            "length",
            Property::with_attributes(JsValue::from(length), false, false, true),
        );
        let func_obj = self.alloc(object);

        if let Some(parent) = prototype_parent {
            let prototype = self.create_object_with_proto(Some(parent));
            if !is_generator {
                prototype
                    .borrow_mut()
                    .define_property("constructor", Property::hidden(JsValue::Object(func_obj.cheap_clone())));
            }
            func_obj.borrow_mut().define_property(
                "prototype",
                Property::with_attributes(JsValue::Object(prototype), true, false, false),
            );
        }
        func_obj
    }

    /// Create a native function object
    pub fn create_native_function<F>(&mut self, name: &str, arity: u32, f: F) -> JsObjectRef
    where
        F: Fn(&mut Interpreter, &JsValue, &[JsValue]) -> Result<JsValue, JsError> + 'static,
    {
        self.create_native(name, arity, Rc::new(f), false)
    }

    /// Create a native function usable with `new`. The function receives
    /// the freshly allocated object as `this`.
    pub fn create_native_constructor<F>(&mut self, name: &str, arity: u32, f: F) -> JsObjectRef
    where
        F: Fn(&mut Interpreter, &JsValue, &[JsValue]) -> Result<JsValue, JsError> + 'static,
    {
        let ctor = self.create_native(name, arity, Rc::new(f), true);
        let prototype = self.create_object();
        prototype
            .borrow_mut()
            .define_property("constructor", Property::hidden(JsValue::Object(ctor.cheap_clone())));
        ctor.borrow_mut().define_property(
            "prototype",
            Property::with_attributes(JsValue::Object(prototype), false, false, false),
        );
        ctor
    }

    fn create_native(&mut self, name: &str, arity: u32, func: NativeFn, constructor: bool) -> JsObjectRef {
        self.create_function(JsFunction::Native(NativeFunction {
            name: JsString::from(name),
            arity,
            func,
            constructor,
        }))
    }

    /// Install a non-enumerable native method on `obj`
    pub fn register_method<F>(&mut self, obj: &JsObjectRef, name: &str, arity: u32, f: F)
    where
        F: Fn(&mut Interpreter, &JsValue, &[JsValue]) -> Result<JsValue, JsError> + 'static,
    {
        let func = self.create_native_function(name, arity, f);
        obj.borrow_mut()
            .define_property(name, Property::hidden(JsValue::Object(func)));
    }

    /// Install a native accessor property on `obj`
    pub fn define_native_accessor(
        &mut self,
        obj: &JsObjectRef,
        name: &str,
        getter: Option<NativeFn>,
        setter: Option<NativeFn>,
    ) {
        let getter = getter.map(|f| self.create_native(&format!("get {}", name), 0, f, false));
        let setter = setter.map(|f| self.create_native(&format!("set {}", name), 1, f, false));
        obj.borrow_mut()
            .define_property(name, Property::accessor(getter, setter, false, true));
    }

    /// `{ value, done }` iterator result object
    pub fn create_iter_result(&mut self, value: JsValue, done: bool) -> JsValue {
        let obj = self.create_object();
        {
            let mut o = obj.borrow_mut();
            o.set_property("value", value);
            o.set_property("done", JsValue::Boolean(done));
        }
        JsValue::Object(obj)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Symbols
    // ═══════════════════════════════════════════════════════════════════════════

    /// `Symbol.for(key)`: one symbol per key for the lifetime of this instance
    pub fn symbol_for(&mut self, key: &str) -> JsSymbol {
        let key = JsString::from(key);
        self.symbol_registry
            .entry(key.cheap_clone())
            .or_insert_with(|| JsSymbol::new(Some(key)))
            .cheap_clone()
    }

    /// `Symbol.keyFor(sym)`
    pub fn symbol_key_for(&self, sym: &JsSymbol) -> Option<JsString> {
        self.symbol_registry
            .iter()
            .find(|(_, registered)| *registered == sym)
            .map(|(key, _)| key.cheap_clone())
    }

    pub fn well_known_symbol(&mut self, which: WellKnownSymbol) -> JsSymbol {
        self.well_known
            .entry(which)
            .or_insert_with(|| JsSymbol::new(Some(JsString::from(which.description()))))
            .cheap_clone()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Errors and stack traces
    // ═══════════════════════════════════════════════════════════════════════════

    /// Push a diagnostic frame, enforcing the depth limit
    pub(crate) fn push_call_site(&mut self, site: CallSite) -> Result<(), JsError> {
        self.check_call_depth()?;
        self.call_stack.push(site);
        Ok(())
    }

    /// Fail if one more frame would exceed the depth limit
    pub(crate) fn check_call_depth(&self) -> Result<(), JsError> {
        if self.call_stack.len() >= self.config.max_call_depth {
            return Err(JsError::range_error("Maximum call stack size exceeded"));
        }
        Ok(())
    }

    /// Snapshot of the diagnostic stack, innermost first
    pub fn capture_stack(&self) -> Vec<StackFrame> {
        self.call_stack
            .iter()
            .rev()
            .map(|site| {
                let (line, column) = site
                    .chunk
                    .as_ref()
                    .and_then(|chunk| chunk.get_source_location(site.ip.saturating_sub(1)))
                    .unwrap_or((0, 0));
                StackFrame {
                    function_name: site.function_name.clone(),
                    line,
                    column,
                }
            })
            .collect()
    }

    fn error_prototype_for(&self, name: &str) -> Option<JsObjectRef> {
        let proto = match name {
            "Error" => &self.error_prototype,
            "TypeError" => &self.type_error_prototype,
            "RangeError" => &self.range_error_prototype,
            "ReferenceError" => &self.reference_error_prototype,
            "SyntaxError" => &self.syntax_error_prototype,
            "URIError" => &self.uri_error_prototype,
            _ => return None,
        };
        Some(proto.cheap_clone())
    }

    /// Create an error object with `message` and a `stack` captured here
    pub fn create_error(&mut self, name: &str, message: &str) -> JsObjectRef {
        let known = self.error_prototype_for(name);
        let proto = known
            .clone()
            .unwrap_or_else(|| self.error_prototype.cheap_clone());

        let mut stack = format!("{}: {}", name, message);
        for frame in self.capture_stack() {
            stack.push('\n');
            stack.push_str(&frame.to_string());
        }

        let mut object = JsObject::new("Error", Some(proto), ExoticObject::Error);
        if known.is_none() {
            object.define_property("name", Property::hidden(JsValue::from(name)));
        }
        object.define_property("message", Property::hidden(JsValue::from(message)));
        object.define_property("stack", Property::hidden(JsValue::from(stack)));
        self.alloc(object)
    }

    /// The value a `catch` block observes for `error`
    pub fn error_to_value(&mut self, error: &JsError) -> JsValue {
        match error {
            JsError::Thrown { value, .. } => value.clone(),
            _ => {
                let (name, message) = error.name_and_message();
                JsValue::Object(self.create_error(name, &message))
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Globals
    // ═══════════════════════════════════════════════════════════════════════════

    /// Set a property on the global object
    pub fn set_global(&mut self, name: &str, value: JsValue) -> Result<(), JsError> {
        let global = self.global.cheap_clone();
        self.put(&global, PropertyKey::from(name), value, true)?;
        Ok(())
    }

    /// Read a global: lexical bindings first, then the global object
    pub fn get_global(&mut self, name: &str) -> Result<JsValue, JsError> {
        let env = self.global_env.cheap_clone();
        self.env_get(&env, &JsString::from(name))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Execution entry points
    // ═══════════════════════════════════════════════════════════════════════════

    /// Run a top-level program in the global scope
    pub fn execute(&mut self, chunk: Rc<BytecodeChunk>) -> Result<JsValue, JsError> {
        self.enter(|interp| {
            let this_value = if chunk.strict {
                JsValue::Undefined
            } else {
                JsValue::Object(interp.global.cheap_clone())
            };
            let env = interp.global_env.cheap_clone();
            let name = chunk
                .name
                .as_ref()
                .map(|n| n.to_rust_string_lossy())
                .unwrap_or_else(|| "<script>".to_string());
            let mut vm = BytecodeVM::new(interp, chunk, env, this_value, &[], name)?;
            vm.run_to_completion(interp)
        })
    }

    /// Call a function from the host
    pub fn call_function(
        &mut self,
        callee: &JsValue,
        this_value: &JsValue,
        args: &[JsValue],
    ) -> Result<JsValue, JsError> {
        self.check_realm(callee)?;
        self.check_realm(this_value)?;
        for arg in args {
            self.check_realm(arg)?;
        }
        self.enter(|interp| interp.call(callee, this_value, args))
    }

    /// `new callee(...args)` from the host
    pub fn construct(&mut self, callee: &JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
        self.check_realm(callee)?;
        for arg in args {
            self.check_realm(arg)?;
        }
        self.enter(|interp| interp.construct_value(callee, args))
    }

    /// Invoke a callable value. Used by natives and the object model; does
    /// not run a checkpoint.
    pub fn call(&mut self, callee: &JsValue, this_value: &JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
        let JsValue::Object(func_obj) = callee else {
            return Err(JsError::type_error(format!("{:?} is not a function", callee)));
        };

        let target = {
            let obj = func_obj.borrow();
            match &obj.exotic {
                ExoticObject::Function(JsFunction::Bytecode(f)) => Callee::Bytecode {
                    template: f.template.cheap_clone(),
                    closure: f.closure.cheap_clone(),
                    captured_this: f.captured_this.clone(),
                },
                ExoticObject::Function(JsFunction::Native(f)) => Callee::Native {
                    name: f.name.cheap_clone(),
                    func: f.func.cheap_clone(),
                },
                ExoticObject::Function(JsFunction::Bound(bound)) => Callee::Bound {
                    target: bound.target.cheap_clone(),
                    this_arg: bound.this_arg.clone(),
                    bound_args: bound.bound_args.clone(),
                },
                ExoticObject::Proxy(proxy) if proxy.callable => Callee::Proxy,
                _ => {
                    return Err(JsError::type_error(format!(
                        "{} is not a function",
                        obj.class
                    )));
                }
            }
        };

        match target {
            Callee::Bytecode {
                template,
                closure,
                captured_this,
            } => match template.kind {
                FunctionKind::Normal | FunctionKind::Arrow => {
                    let this_value = captured_this.unwrap_or_else(|| this_value.clone());
                    let mut vm = BytecodeVM::for_function(self, func_obj, &template, closure, this_value, args, None)?;
                    vm.run_to_completion(self)
                }
                FunctionKind::Generator => self.create_generator(func_obj, &template, closure, this_value, args),
                FunctionKind::Async => {
                    let this_value = captured_this.unwrap_or_else(|| this_value.clone());
                    self.start_async_function(&template, closure, this_value, args)
                }
            },
            Callee::Native { name, func } => {
                self.push_call_site(CallSite {
                    function_name: name.to_rust_string_lossy(),
                    chunk: None,
                    ip: 0,
                })?;
                let depth = self.call_stack.len();
                let result = func(self, this_value, args);
                self.call_stack.truncate(depth - 1);
                result
            }
            Callee::Bound {
                target,
                this_arg,
                mut bound_args,
            } => {
                bound_args.extend_from_slice(args);
                self.call(&JsValue::Object(target), &this_arg, &bound_args)
            }
            Callee::Proxy => self.proxy_call(func_obj, this_value, args),
        }
    }

    /// `new callee(...args)` without a checkpoint
    pub fn construct_value(&mut self, callee: &JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
        let Some(func_obj) = callee.as_object().filter(|o| o.is_constructor()) else {
            return Err(JsError::type_error(format!("{:?} is not a constructor", callee)));
        };
        let func_obj = func_obj.cheap_clone();

        let bound = match &func_obj.borrow().exotic {
            ExoticObject::Function(JsFunction::Bound(bound)) => {
                Some((bound.target.cheap_clone(), bound.bound_args.clone()))
            }
            _ => None,
        };
        if let Some((target, mut bound_args)) = bound {
            bound_args.extend_from_slice(args);
            return self.construct_value(&JsValue::Object(target), &bound_args);
        }
        if func_obj.borrow().is_proxy() {
            return self.proxy_construct(&func_obj, args);
        }

        let this_obj = self.ordinary_create_from_constructor(&func_obj)?;
        let template = match &func_obj.borrow().exotic {
            ExoticObject::Function(JsFunction::Bytecode(f)) => {
                Some((f.template.cheap_clone(), f.closure.cheap_clone()))
            }
            _ => None,
        };
        let result = match template {
            Some((template, closure)) => {
                let mut vm = BytecodeVM::for_function(
                    self,
                    &func_obj,
                    &template,
                    closure,
                    JsValue::Object(this_obj.cheap_clone()),
                    args,
                    Some(this_obj.cheap_clone()),
                )?;
                vm.run_to_completion(self)?
            }
            None => self.call(
                &JsValue::Object(func_obj.cheap_clone()),
                &JsValue::Object(this_obj.cheap_clone()),
                args,
            )?,
        };
        Ok(match result {
            JsValue::Object(obj) => JsValue::Object(obj),
            _ => JsValue::Object(this_obj),
        })
    }

    /// Allocate `this` for `new`, inheriting from `callee.prototype`
    pub(crate) fn ordinary_create_from_constructor(&mut self, callee: &JsObjectRef) -> Result<JsObjectRef, JsError> {
        let proto = match self.get_property(callee, &PropertyKey::from("prototype"))? {
            JsValue::Object(proto) => proto,
            _ => self.object_prototype.cheap_clone(),
        };
        Ok(self.create_object_with_proto(Some(proto)))
    }
}

/// What `call` resolved a callee to, extracted so no borrow is held
enum Callee {
    Bytecode {
        template: Rc<FunctionTemplate>,
        closure: EnvRef,
        captured_this: Option<JsValue>,
    },
    Native {
        name: JsString,
        func: NativeFn,
    },
    Bound {
        target: JsObjectRef,
        this_arg: JsValue,
        bound_args: Vec<JsValue>,
    },
    Proxy,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Objects are reference counted and the object graph is cyclic
/// (functions and their prototypes, closures and their scopes), so tearing
/// down an instance clears every object it allocated.
impl Drop for Interpreter {
    fn drop(&mut self) {
        self.jobs.clear();
        self.global_env.borrow_mut().bindings.clear();
        let mut released = Vec::with_capacity(self.allocations.len());
        for weak in self.allocations.drain(..) {
            if let Some(obj) = weak.upgrade()
                && let Some(mut data) = obj.try_borrow_mut()
            {
                released.push(data.clear_references());
            }
        }
        drop(released);
    }
}
