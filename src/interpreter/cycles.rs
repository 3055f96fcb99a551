//! Cycle collection
//!
//! Objects are reference counted, so a cycle (a function and its
//! `prototype`, an object that stores itself, a closure captured by its
//! own scope) keeps itself alive after the last outside handle is gone.
//!
//! A collection pass builds a graph of every object this instance
//! allocated plus the scopes they reach. For each node, the strong count
//! minus the edges coming from other nodes is the number of handles held
//! from outside the graph (host code, the interpreter's own fields, native
//! closures, queued jobs). Nodes with outside handles are the roots; the
//! mark phase walks from them, and every unmarked node has its references
//! cleared so the cycle falls apart and reference counting frees it.
//!
//! WeakMap/WeakSet entries are ephemerons: an entry's value is reached
//! only if both the table and the key are.
//!
//! Anything the tracer cannot see into (native closures, shared inner
//! state) keeps its targets alive, so a missed edge can only retain memory,
//! never free a live object.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::JsError;
use crate::object::{ExoticObject, JsFunction, JsObject, JsObjectRef, Property, WeakObjectRef};
use crate::prelude::FxHashMap;
use crate::value::JsValue;

use super::Interpreter;
use super::environment::{EnvRef, Scope};

/// Types that hold references into the object graph
pub(crate) trait Trace {
    /// Report every strong reference held directly by `self`, exactly once
    fn trace(&self, tracer: &mut Tracer);
}

enum Node {
    Object(JsObjectRef),
    Scope(EnvRef),
}

impl Node {
    fn strong_count(&self) -> usize {
        match self {
            Node::Object(obj) => obj.strong_count(),
            Node::Scope(env) => Rc::strong_count(env),
        }
    }
}

/// WeakMap/WeakSet entry: `value` is live once `table` and `key` are
struct Ephemeron {
    table: usize,
    key: u64,
    value: usize,
}

pub(crate) struct Tracer {
    nodes: Vec<Node>,
    objects: FxHashMap<u64, usize>,
    scopes: FxHashMap<*const RefCell<Scope>, usize>,
    /// Edges into each node from other nodes
    incoming: Vec<usize>,
    edges: Vec<Vec<usize>>,
    ephemerons: Vec<Ephemeron>,
    /// Nodes that could not be inspected; always roots
    pinned: Vec<bool>,
    current: usize,
}

impl Tracer {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            objects: FxHashMap::default(),
            scopes: FxHashMap::default(),
            incoming: Vec::new(),
            edges: Vec::new(),
            ephemerons: Vec::new(),
            pinned: Vec::new(),
            current: 0,
        }
    }

    fn push_node(&mut self, node: Node) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(node);
        self.incoming.push(0);
        self.edges.push(Vec::new());
        self.pinned.push(false);
        idx
    }

    fn add_object(&mut self, obj: JsObjectRef) {
        let id = obj.id();
        if !self.objects.contains_key(&id) {
            let idx = self.push_node(Node::Object(obj));
            self.objects.insert(id, idx);
        }
    }

    fn link(&mut self, target: usize) {
        self.incoming[target] += 1;
        self.edges[self.current].push(target);
    }

    pub(crate) fn object(&mut self, obj: &JsObjectRef) {
        // Objects outside the graph belong to nobody we can clear
        if let Some(&idx) = self.objects.get(&obj.id()) {
            self.link(idx);
        }
    }

    pub(crate) fn value(&mut self, value: &JsValue) {
        if let JsValue::Object(obj) = value {
            self.object(obj);
        }
    }

    pub(crate) fn values<'a>(&mut self, values: impl IntoIterator<Item = &'a JsValue>) {
        for value in values {
            self.value(value);
        }
    }

    pub(crate) fn scope(&mut self, env: &EnvRef) {
        let ptr = Rc::as_ptr(env);
        let idx = match self.scopes.get(&ptr) {
            Some(&idx) => idx,
            None => {
                let idx = self.push_node(Node::Scope(env.clone()));
                self.scopes.insert(ptr, idx);
                idx
            }
        };
        self.link(idx);
    }

    pub(crate) fn error(&mut self, error: &JsError) {
        if let Some(value) = error.thrown_value() {
            self.value(value);
        }
    }

    /// A weak-keyed entry: the value counts as held by the table, but is
    /// only marked through it while the key is marked too
    pub(crate) fn ephemeron(&mut self, key: &WeakObjectRef, value: &JsValue) {
        let JsValue::Object(obj) = value else {
            return;
        };
        if let Some(&idx) = self.objects.get(&obj.id()) {
            self.incoming[idx] += 1;
            self.ephemerons.push(Ephemeron {
                table: self.current,
                key: key.id(),
                value: idx,
            });
        }
    }

    /// Trace through shared inner state only while `self` is its sole
    /// owner; otherwise its targets stay externally held
    pub(crate) fn owned<T: Trace>(&mut self, inner: &Rc<RefCell<T>>) {
        if Rc::strong_count(inner) == 1
            && let Ok(inner) = inner.try_borrow()
        {
            inner.trace(self);
        }
    }

    fn trace_all(&mut self) {
        let mut idx = 0;
        // Scopes found while tracing are appended and traced in turn
        while idx < self.nodes.len() {
            self.current = idx;
            let node = match &self.nodes[idx] {
                Node::Object(obj) => Node::Object(obj.clone()),
                Node::Scope(env) => Node::Scope(env.clone()),
            };
            let traced = match &node {
                Node::Object(obj) => match obj.try_borrow() {
                    Some(data) => {
                        data.trace(self);
                        true
                    }
                    None => false,
                },
                Node::Scope(env) => match env.try_borrow() {
                    Ok(scope) => {
                        scope.trace(self);
                        true
                    }
                    Err(_) => false,
                },
            };
            if !traced {
                self.pinned[idx] = true;
            }
            idx += 1;
        }
    }

    fn mark(&self) -> Vec<bool> {
        let mut marked = vec![false; self.nodes.len()];
        let mut stack: Vec<usize> = (0..self.nodes.len())
            .filter(|&idx| {
                // The tracer's own handle accounts for one strong count
                let held = self.nodes[idx].strong_count().saturating_sub(1);
                self.pinned[idx] || held != self.incoming[idx]
            })
            .collect();

        loop {
            while let Some(idx) = stack.pop() {
                if marked[idx] {
                    continue;
                }
                marked[idx] = true;
                stack.extend(self.edges[idx].iter().copied().filter(|&t| !marked[t]));
            }

            for e in &self.ephemerons {
                let key_marked = self.objects.get(&e.key).is_none_or(|&k| marked[k]);
                if marked[e.table] && key_marked && !marked[e.value] {
                    stack.push(e.value);
                }
            }
            if stack.is_empty() {
                break;
            }
        }
        marked
    }
}

impl Trace for Scope {
    fn trace(&self, tracer: &mut Tracer) {
        for binding in self.bindings.values() {
            if let Some(value) = &binding.value {
                tracer.value(value);
            }
        }
        if let Some(outer) = &self.outer {
            tracer.scope(outer);
        }
    }
}

impl Trace for Property {
    fn trace(&self, tracer: &mut Tracer) {
        match self {
            Property::Plain(value) | Property::Data { value, .. } => tracer.value(value),
            Property::Accessor { getter, setter, .. } => {
                if let Some(getter) = getter {
                    tracer.object(getter);
                }
                if let Some(setter) = setter {
                    tracer.object(setter);
                }
            }
        }
    }
}

impl Trace for JsFunction {
    fn trace(&self, tracer: &mut Tracer) {
        match self {
            JsFunction::Bytecode(func) => {
                tracer.scope(&func.closure);
                if let Some(this) = &func.captured_this {
                    tracer.value(this);
                }
            }
            // Captures of a host closure are opaque
            JsFunction::Native(_) => {}
            JsFunction::Bound(bound) => {
                tracer.object(&bound.target);
                tracer.value(&bound.this_arg);
                tracer.values(&bound.bound_args);
            }
        }
    }
}

impl Trace for JsObject {
    fn trace(&self, tracer: &mut Tracer) {
        if let Some(proto) = &self.prototype {
            tracer.object(proto);
        }
        for property in self.properties.values() {
            property.trace(tracer);
        }
        match &self.exotic {
            ExoticObject::Ordinary | ExoticObject::Array { .. } | ExoticObject::Error => {}
            ExoticObject::Function(func) => func.trace(tracer),
            ExoticObject::Primitive(value) => tracer.value(value),
            ExoticObject::Map(entries) => {
                for (key, value) in entries {
                    tracer.value(&key.0);
                    tracer.value(value);
                }
            }
            ExoticObject::Set(entries) => {
                for key in entries.keys() {
                    tracer.value(&key.0);
                }
            }
            ExoticObject::WeakMap(table) | ExoticObject::WeakSet(table) => table.trace(tracer),
            ExoticObject::Generator(co) => tracer.owned(co),
            ExoticObject::Promise(state) => tracer.owned(state),
            ExoticObject::Proxy(proxy) => {
                if let Some(target) = &proxy.target {
                    tracer.object(target);
                }
                if let Some(handler) = &proxy.handler {
                    tracer.object(handler);
                }
            }
        }
    }
}

impl Interpreter {
    /// Reclaim unreachable reference cycles among the objects this
    /// instance allocated. Returns the number of objects released.
    ///
    /// Only runs between top-level invocations; called while a script is
    /// running it does nothing.
    pub fn collect_cycles(&mut self) -> usize {
        if self.entry_depth > 0 {
            return 0;
        }
        self.collect_unreachable()
    }

    pub(crate) fn collect_unreachable(&mut self) -> usize {
        self.allocations.retain(WeakObjectRef::is_alive);

        let mut tracer = Tracer::new();
        for weak in &self.allocations {
            if let Some(obj) = weak.upgrade() {
                tracer.add_object(obj);
            }
        }
        tracer.trace_all();
        let marked = tracer.mark();

        let mut released_objects = Vec::new();
        let mut released_scopes = Vec::new();
        for (node, _) in tracer.nodes.iter().zip(&marked).filter(|(_, marked)| !**marked) {
            match node {
                Node::Object(obj) => {
                    if let Some(mut data) = obj.try_borrow_mut() {
                        released_objects.push(data.clear_references());
                    }
                    // Unreachable keys leave their weak tables at the sweep
                    self.finalization.push(obj.id());
                }
                Node::Scope(env) => {
                    if let Ok(mut scope) = env.try_borrow_mut() {
                        let bindings = std::mem::take(&mut scope.bindings);
                        released_scopes.push((bindings, scope.outer.take()));
                    }
                }
            }
        }
        let collected = released_objects.len();

        // Cleared contents are dropped while the tracer still holds every
        // node, so no object is freed while another is borrowed
        drop(released_objects);
        drop(released_scopes);
        let nodes = tracer.nodes.len();
        drop(tracer);
        self.allocations.retain(WeakObjectRef::is_alive);
        self.allocated_since_collection = 0;
        self.sweep_weak_collections();

        tracing::debug!(nodes, collected, "cycle collection finished");
        collected
    }
}
