//! Topology Python bindings.
//!
//! Python builds protection domains before it knows which system they belong to, and nests
//! children under parents that may themselves be unattached. A `ProtectionDomain` therefore
//! starts out *staged*: it owns its core domain and a list of staged children, with child IDs
//! allocated from a local allocator. The first time a staged domain is used with a system
//! (added, given a child, wired into a channel or subsystem) its whole staged tree moves into
//! that system's arena in one transaction and every handle flips to *attached*. A tree moved
//! in by use alone is not listed until `SystemDescription.add_pd` registers its root.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use sdfgen_core::common::IdKind;
use sdfgen_core::sdf::{AllocError, ChannelOptions, IdAllocator, PdId, ProtectionDomain};
use sdfgen_core::{SdfError, SystemDescription, SystemSpec};

use crate::conversion::{arch_from_int, lock, to_py_err};

/// A system description shared by every Python object bound to it.
pub type SharedSystem = Arc<Mutex<SystemDescription>>;

/// Python-exposed system description: the arena plus its rendering.
#[pyclass(name = "SystemDescription", module = "sdfgen", frozen)]
#[derive(Debug)]
pub struct PySystemDescription {
    pub(crate) inner: SharedSystem,
}

#[derive(Debug)]
enum PdSlot {
    Staged(Staged),
    Attached { sdf: SharedSystem, id: PdId },
}

#[derive(Debug)]
struct Staged {
    pd: ProtectionDomain,
    child_ids: IdAllocator,
    children: Vec<(u8, Py<PyProtectionDomain>)>,
    parent: Option<Py<PyProtectionDomain>>,
}

/// Python-exposed protection domain handle.
#[pyclass(name = "ProtectionDomain", module = "sdfgen", frozen)]
#[derive(Debug)]
pub struct PyProtectionDomain {
    name: String,
    slot: Mutex<PdSlot>,
}

/// Python-exposed channel request; committed by `SystemDescription.add_channel`.
#[pyclass(name = "Channel", module = "sdfgen", frozen)]
#[derive(Debug)]
pub struct PyChannel {
    a: Py<PyProtectionDomain>,
    b: Py<PyProtectionDomain>,
    options: ChannelOptions,
    assigned: Mutex<Option<(u8, u8)>>,
}

/// One domain of a staged tree, flattened parent-first.
struct Planned {
    handle: Py<PyProtectionDomain>,
    pd: ProtectionDomain,
    /// Index of the parent in the plan and the child ID claimed in it.
    parent: Option<(usize, u8)>,
}

/// Where the root of a staged tree goes.
#[derive(Clone, Copy)]
enum Anchor {
    /// Listed at top level.
    TopLevel,
    /// Linked under a parent, claiming the child ID if one is given.
    Child(PdId, Option<u8>),
    /// Created but not listed.
    Floating,
}

#[pymethods]
impl PySystemDescription {
    /// Creates an empty system.
    ///
    /// # Arguments
    ///
    /// * `arch` - Architecture code (`0` aarch32, `1` aarch64, `2` riscv32, `3` riscv64,
    ///   `4` x86, `5` x86_64).
    /// * `paddr_top` - Upper bound for physical addresses allocated to DMA regions.
    #[new]
    fn new(arch: u8, paddr_top: u64) -> PyResult<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(SystemDescription::new(
                arch_from_int(arch)?,
                paddr_top,
            ))),
        })
    }

    /// Builds a system from a JSON system spec.
    ///
    /// # Returns
    ///
    /// The system and a dict from every domain name to its attached handle.
    #[staticmethod]
    fn from_json(json: &str) -> PyResult<(Self, BTreeMap<String, PyProtectionDomain>)> {
        let spec = SystemSpec::from_json(json).map_err(to_py_err)?;
        let (sdf, names) = spec.build().map_err(to_py_err)?;
        let shared = Arc::new(Mutex::new(sdf));
        let handles = names
            .into_iter()
            .map(|(name, id)| {
                let handle = PyProtectionDomain {
                    name: name.clone(),
                    slot: Mutex::new(PdSlot::Attached {
                        sdf: Arc::clone(&shared),
                        id,
                    }),
                };
                (name, handle)
            })
            .collect();
        Ok((Self { inner: shared }, handles))
    }

    /// Lists a domain, and every child nested under it, at top level.
    ///
    /// A domain already used with this system (in a channel, a subsystem, or as a parent)
    /// is listed where it is; a staged one is moved in first.
    fn add_pd(&self, py: Python<'_>, pd: &Bound<'_, PyProtectionDomain>) -> PyResult<()> {
        match pd.get().attached_in(&self.inner)? {
            Some(id) => lock(&self.inner)?.register_pd(id).map_err(to_py_err),
            None => attach(py, &self.inner, pd, Anchor::TopLevel).map(|_| ()),
        }
    }

    /// Commits a channel between two domains of this system.
    fn add_channel(&self, py: Python<'_>, channel: &Bound<'_, PyChannel>) -> PyResult<()> {
        let channel = channel.get();
        let mut assigned = lock(&channel.assigned)?;
        if assigned.is_some() {
            return Err(PyValueError::new_err("channel already added to a system"));
        }
        let a = PyProtectionDomain::handle_in(channel.a.bind(py), &self.inner)?;
        let b = PyProtectionDomain::handle_in(channel.b.bind(py), &self.inner)?;
        let committed = lock(&self.inner)?
            .add_channel(a, b, channel.options)
            .map_err(to_py_err)?;
        *assigned = Some((committed.a_id, committed.b_id));
        Ok(())
    }

    /// Renders the XML system description.
    fn render(&self) -> PyResult<String> {
        Ok(lock(&self.inner)?.render())
    }

    /// Alias of `render`.
    fn xml(&self) -> PyResult<String> {
        self.render()
    }

    fn __str__(&self) -> PyResult<String> {
        self.render()
    }
}

#[pymethods]
impl PyProtectionDomain {
    /// Creates a staged domain.
    #[new]
    #[pyo3(signature = (name, program_image, priority=None, budget=None, period=None, stack_size=None, cpu=None, passive=false))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        name: String,
        program_image: String,
        priority: Option<u8>,
        budget: Option<u32>,
        period: Option<u32>,
        stack_size: Option<u32>,
        cpu: Option<u8>,
        passive: bool,
    ) -> Self {
        let mut pd = ProtectionDomain::new(name.clone(), program_image).with_passive(passive);
        if let Some(priority) = priority {
            pd = pd.with_priority(priority);
        }
        if let Some(budget) = budget {
            pd = pd.with_budget(budget);
        }
        if let Some(period) = period {
            pd = pd.with_period(period);
        }
        if let Some(stack_size) = stack_size {
            pd = pd.with_stack_size(stack_size);
        }
        if let Some(cpu) = cpu {
            pd = pd.with_cpu(cpu);
        }
        Self {
            name,
            slot: Mutex::new(PdSlot::Staged(Staged {
                pd,
                child_ids: IdAllocator::new(),
                children: Vec::new(),
                parent: None,
            })),
        }
    }

    /// Domain name.
    #[getter]
    fn name(&self) -> &str {
        &self.name
    }

    /// Nests `child` under this domain.
    ///
    /// When either domain already belongs to a system, both are resolved in that system and
    /// the child is linked there; otherwise the child is staged under this domain.
    ///
    /// # Arguments
    ///
    /// * `child` - A domain that is not yet listed or anyone's child.
    /// * `child_id` - Child ID to claim, or `None` for the lowest free one.
    ///
    /// # Returns
    ///
    /// The child ID within this domain.
    #[pyo3(signature = (child, child_id=None))]
    fn add_child_pd(
        slf: &Bound<'_, Self>,
        child: &Bound<'_, Self>,
        child_id: Option<u8>,
    ) -> PyResult<u8> {
        let py = slf.py();
        if subtree_contains(py, child, slf)? {
            return Err(to_py_err(SdfError::SameDomain(child.get().name.clone())));
        }
        let child_sdf = child.get().system()?;
        if child_sdf.is_none() {
            child.get().check_adoptable()?;
        }
        let Some(sdf) = slf.get().system()?.or(child_sdf) else {
            return Self::stage_child(slf, child, child_id);
        };

        let parent = Self::handle_in(slf, &sdf)?;
        match child.get().attached_in(&sdf)? {
            Some(id) => lock(&sdf)?
                .adopt_child(parent, id, child_id)
                .map_err(to_py_err),
            None => attach(py, &sdf, child, Anchor::Child(parent, child_id)),
        }
    }

    fn __repr__(&self) -> String {
        format!("ProtectionDomain({:?})", self.name)
    }
}

impl PyProtectionDomain {
    /// Returns the handle of this domain in `sdf`, moving its staged tree there unlisted if
    /// it is not attached yet.
    ///
    /// # Returns
    ///
    /// `ValueError` if the domain belongs to another system.
    pub(crate) fn handle_in(slf: &Bound<'_, Self>, sdf: &SharedSystem) -> PyResult<PdId> {
        if let Some(id) = slf.get().attached_in(sdf)? {
            return Ok(id);
        }
        let root = staged_root(slf)?;
        let _ = attach(slf.py(), sdf, &root, Anchor::Floating)?;
        slf.get()
            .attached_in(sdf)?
            .ok_or_else(|| not_in_system(&slf.get().name))
    }

    /// Returns the handle in `sdf`, or `None` while staged.
    ///
    /// # Returns
    ///
    /// `ValueError` if the domain belongs to another system.
    fn attached_in(&self, sdf: &SharedSystem) -> PyResult<Option<PdId>> {
        match &*lock(&self.slot)? {
            PdSlot::Attached { sdf: owner, id } if Arc::ptr_eq(owner, sdf) => Ok(Some(*id)),
            PdSlot::Attached { .. } => Err(not_in_system(&self.name)),
            PdSlot::Staged(_) => Ok(None),
        }
    }

    /// Returns the system the domain is attached to, if any.
    fn system(&self) -> PyResult<Option<SharedSystem>> {
        Ok(match &*lock(&self.slot)? {
            PdSlot::Attached { sdf, .. } => Some(Arc::clone(sdf)),
            PdSlot::Staged(_) => None,
        })
    }

    /// Fails unless the domain is staged and has no parent.
    fn check_adoptable(&self) -> PyResult<()> {
        match &*lock(&self.slot)? {
            PdSlot::Staged(staged) if staged.parent.is_none() => Ok(()),
            _ => Err(to_py_err(SdfError::AlreadyRegistered(self.name.clone()))),
        }
    }

    /// Stages `child` under `slf`, both still staged.
    fn stage_child(
        slf: &Bound<'_, Self>,
        child: &Bound<'_, Self>,
        child_id: Option<u8>,
    ) -> PyResult<u8> {
        let mut slot = lock(&slf.get().slot)?;
        let PdSlot::Staged(parent) = &mut *slot else {
            return Err(to_py_err(SdfError::AlreadyRegistered(slf.get().name.clone())));
        };
        let id = parent
            .child_ids
            .allocate(child_id)
            .map_err(|err| to_py_err(child_alloc_error(parent.pd.name(), err)))?;
        parent.children.push((id, child.clone().unbind()));
        drop(slot);
        if let PdSlot::Staged(staged) = &mut *lock(&child.get().slot)? {
            staged.parent = Some(slf.clone().unbind());
        }
        Ok(id)
    }
}

#[pymethods]
impl PyChannel {
    /// Describes a channel between `a` and `b`.
    #[new]
    #[pyo3(signature = (a, b, pp_a=false, pp_b=false, notify_a=true, notify_b=true, a_id=None, b_id=None))]
    #[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
    fn new(
        a: Py<PyProtectionDomain>,
        b: Py<PyProtectionDomain>,
        pp_a: bool,
        pp_b: bool,
        notify_a: bool,
        notify_b: bool,
        a_id: Option<u8>,
        b_id: Option<u8>,
    ) -> Self {
        Self {
            a,
            b,
            options: ChannelOptions {
                pp_a,
                pp_b,
                notify_a,
                notify_b,
                a_id,
                b_id,
            },
            assigned: Mutex::new(None),
        }
    }

    /// Slot ID of end `a`, once added to a system.
    #[getter]
    fn a_id(&self) -> PyResult<Option<u8>> {
        Ok(lock(&self.assigned)?.map(|(a, _)| a))
    }

    /// Slot ID of end `b`, once added to a system.
    #[getter]
    fn b_id(&self) -> PyResult<Option<u8>> {
        Ok(lock(&self.assigned)?.map(|(_, b)| b))
    }
}

fn not_in_system(name: &str) -> PyErr {
    PyValueError::new_err(format!("protection domain '{name}' is not part of this system"))
}

fn child_alloc_error(scope: &str, err: AllocError) -> SdfError {
    match err {
        AllocError::Exhausted => SdfError::Exhausted {
            scope: scope.to_string(),
            kind: IdKind::Child,
        },
        AllocError::Collision(id) => SdfError::Collision {
            scope: scope.to_string(),
            kind: IdKind::Child,
            id,
        },
    }
}

/// Returns `true` if `target` is `root` or staged somewhere below it.
fn subtree_contains(
    py: Python<'_>,
    root: &Bound<'_, PyProtectionDomain>,
    target: &Bound<'_, PyProtectionDomain>,
) -> PyResult<bool> {
    if root.as_ptr() == target.as_ptr() {
        return Ok(true);
    }
    let children: Vec<Py<PyProtectionDomain>> = match &*lock(&root.get().slot)? {
        PdSlot::Staged(staged) => staged.children.iter().map(|(_, c)| c.clone_ref(py)).collect(),
        PdSlot::Attached { .. } => return Ok(false),
    };
    for child in children {
        if subtree_contains(py, child.bind(py), target)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Follows staged parents up from `pd` to the root of its staged tree.
fn staged_root<'py>(
    pd: &Bound<'py, PyProtectionDomain>,
) -> PyResult<Bound<'py, PyProtectionDomain>> {
    let py = pd.py();
    let mut current = pd.clone();
    loop {
        let parent = match &*lock(&current.get().slot)? {
            PdSlot::Staged(staged) => staged.parent.as_ref().map(|p| p.clone_ref(py)),
            PdSlot::Attached { .. } => None,
        };
        match parent {
            Some(parent) => current = parent.into_bound(py),
            None => return Ok(current),
        }
    }
}

/// Flattens the staged tree under `root` parent-first.
fn plan_tree(
    py: Python<'_>,
    root: &Bound<'_, PyProtectionDomain>,
    parent: Option<(usize, u8)>,
    plan: &mut Vec<Planned>,
) -> PyResult<()> {
    let children: Vec<(u8, Py<PyProtectionDomain>)> = match &*lock(&root.get().slot)? {
        PdSlot::Staged(staged) => {
            plan.push(Planned {
                handle: root.clone().unbind(),
                pd: staged.pd.clone(),
                parent,
            });
            staged
                .children
                .iter()
                .map(|(id, c)| (*id, c.clone_ref(py)))
                .collect()
        }
        PdSlot::Attached { .. } => {
            return Err(to_py_err(SdfError::AlreadyRegistered(
                root.get().name.clone(),
            )));
        }
    };
    let index = plan.len() - 1;
    for (id, child) in children {
        plan_tree(py, child.bind(py), Some((index, id)), plan)?;
    }
    Ok(())
}

/// Moves the staged tree under `root` into `sdf`.
///
/// # Returns
///
/// The root's child ID when anchored under a parent, `0` otherwise.
fn attach(
    py: Python<'_>,
    sdf: &SharedSystem,
    root: &Bound<'_, PyProtectionDomain>,
    anchor: Anchor,
) -> PyResult<u8> {
    if matches!(anchor, Anchor::TopLevel) {
        root.get().check_adoptable()?;
    }
    let mut plan = Vec::new();
    plan_tree(py, root, None, &mut plan)?;

    let (ids, root_id) = lock(sdf)?
        .transaction(|sdf| {
            let mut ids: Vec<PdId> = Vec::with_capacity(plan.len());
            let mut root_id = 0;
            for entry in &plan {
                let id = sdf.create_pd(entry.pd.clone());
                match (entry.parent, anchor) {
                    (Some((parent, child_id)), _) => {
                        let _ = sdf.adopt_child(ids[parent], id, Some(child_id))?;
                    }
                    (None, Anchor::TopLevel) => sdf.register_pd(id)?,
                    (None, Anchor::Floating) => {}
                    (None, Anchor::Child(parent, child_id)) => {
                        root_id = sdf.adopt_child(parent, id, child_id)?;
                    }
                }
                ids.push(id);
            }
            Ok((ids, root_id))
        })
        .map_err(to_py_err)?;

    for (entry, id) in plan.iter().zip(ids) {
        *lock(&entry.handle.bind(py).get().slot)? = PdSlot::Attached {
            sdf: Arc::clone(sdf),
            id,
        };
    }
    Ok(root_id)
}
