//! Protection domains.

use super::ids::{AllocError, IdAllocator};
use super::mr::Map;
use crate::common::constants::VADDR_BASE;
use crate::common::{IdKind, SdfError};

/// Handle to a protection domain inside a `SystemDescription`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PdId(pub(crate) usize);

impl PdId {
    /// Returns the arena index behind this handle.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Interrupt trigger mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IrqTrigger {
    /// Edge triggered.
    Edge,
    /// Level triggered.
    #[default]
    Level,
}

impl IrqTrigger {
    /// Returns the name used in the rendered description.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Edge => "edge",
            Self::Level => "level",
        }
    }
}

/// An interrupt delivered to a protection domain on one of its channel slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Irq {
    /// Kernel IRQ number.
    pub irq: u32,
    /// Trigger mode.
    pub trigger: IrqTrigger,
    /// Channel slot the IRQ is delivered on.
    pub id: u8,
}

/// An isolated program with its own address space and scheduling parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionDomain {
    name: String,
    program_image: String,
    priority: Option<u8>,
    budget: Option<u32>,
    period: Option<u32>,
    stack_size: Option<u32>,
    cpu: Option<u8>,
    passive: bool,
    pub(crate) parent: Option<PdId>,
    pub(crate) children: Vec<(u8, PdId)>,
    pub(crate) maps: Vec<Map>,
    pub(crate) irqs: Vec<Irq>,
    child_ids: IdAllocator,
    channel_ids: IdAllocator,
    pub(crate) vaddr_cursor: u64,
}

impl ProtectionDomain {
    /// Creates a domain with no scheduling parameters set.
    ///
    /// # Arguments
    ///
    /// * `name` - Unique domain name.
    /// * `program_image` - File name of the program the domain runs.
    pub fn new(name: impl Into<String>, program_image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program_image: program_image.into(),
            priority: None,
            budget: None,
            period: None,
            stack_size: None,
            cpu: None,
            passive: false,
            parent: None,
            children: Vec::new(),
            maps: Vec::new(),
            irqs: Vec::new(),
            child_ids: IdAllocator::new(),
            channel_ids: IdAllocator::new(),
            vaddr_cursor: VADDR_BASE,
        }
    }

    /// Sets the scheduling priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the scheduling budget in microseconds.
    #[must_use]
    pub const fn with_budget(mut self, budget: u32) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Sets the scheduling period in microseconds.
    #[must_use]
    pub const fn with_period(mut self, period: u32) -> Self {
        self.period = Some(period);
        self
    }

    /// Sets the stack size in bytes.
    #[must_use]
    pub const fn with_stack_size(mut self, stack_size: u32) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Pins the domain to a CPU core.
    #[must_use]
    pub const fn with_cpu(mut self, cpu: u8) -> Self {
        self.cpu = Some(cpu);
        self
    }

    /// Marks the domain passive (runs only on its callers' budgets).
    #[must_use]
    pub const fn with_passive(mut self, passive: bool) -> Self {
        self.passive = passive;
        self
    }

    /// Returns the domain name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the program image file name.
    pub fn program_image(&self) -> &str {
        &self.program_image
    }

    /// Returns the scheduling priority, if set.
    pub const fn priority(&self) -> Option<u8> {
        self.priority
    }

    /// Returns the scheduling budget, if set.
    pub const fn budget(&self) -> Option<u32> {
        self.budget
    }

    /// Returns the scheduling period, if set.
    pub const fn period(&self) -> Option<u32> {
        self.period
    }

    /// Returns the stack size, if set.
    pub const fn stack_size(&self) -> Option<u32> {
        self.stack_size
    }

    /// Returns the pinned CPU, if set.
    pub const fn cpu(&self) -> Option<u8> {
        self.cpu
    }

    /// Returns `true` if the domain is passive.
    pub const fn passive(&self) -> bool {
        self.passive
    }

    /// Returns the parent domain of a child, or `None` for a top-level domain.
    pub const fn parent(&self) -> Option<PdId> {
        self.parent
    }

    /// Returns the children as `(child ID, handle)` pairs in insertion order.
    pub fn children(&self) -> &[(u8, PdId)] {
        &self.children
    }

    /// Returns the domain's mappings in insertion order.
    pub fn maps(&self) -> &[Map] {
        &self.maps
    }

    /// Returns the domain's IRQs in insertion order.
    pub fn irqs(&self) -> &[Irq] {
        &self.irqs
    }

    /// Returns the channel-slot allocator (channel ends and IRQs).
    pub const fn channel_ids(&self) -> &IdAllocator {
        &self.channel_ids
    }

    /// Returns the child-ID allocator.
    pub const fn child_ids(&self) -> &IdAllocator {
        &self.child_ids
    }

    pub(crate) fn allocate_channel_id(&mut self, requested: Option<u8>) -> Result<u8, SdfError> {
        let result = self.channel_ids.allocate(requested);
        self.alloc_result(result, IdKind::Channel)
    }

    pub(crate) fn release_channel_id(&mut self, id: u8) {
        self.channel_ids.release(id);
    }

    pub(crate) fn allocate_child_id(&mut self, requested: Option<u8>) -> Result<u8, SdfError> {
        let result = self.child_ids.allocate(requested);
        self.alloc_result(result, IdKind::Child)
    }

    fn alloc_result(&self, result: Result<u8, AllocError>, kind: IdKind) -> Result<u8, SdfError> {
        match result {
            Ok(id) => {
                tracing::debug!(pd = %self.name, %kind, id, "allocated id");
                Ok(id)
            }
            Err(AllocError::Exhausted) => Err(SdfError::Exhausted {
                scope: self.name.clone(),
                kind,
            }),
            Err(AllocError::Collision(id)) => Err(SdfError::Collision {
                scope: self.name.clone(),
                kind,
                id,
            }),
        }
    }
}
