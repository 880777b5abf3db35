//! Typed attachments on state declarations.
//!
//! Layers above the core attach their own data to a
//! [`StateDeclaration`](crate::state::StateDeclaration) without the core
//! knowing the types: the runtime keeps state callbacks here, and hook
//! predicates read markers back from the built [`State`](crate::state::State).
//! One value per type; read-only once the state is built.

use ahash::AHashMap;
use std::any::{Any, TypeId, type_name};
use std::fmt;

struct Slot {
    type_name: &'static str,
    value: Box<dyn Any + Send + Sync>,
}

impl Slot {
    fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            type_name: type_name::<T>(),
            value: Box::new(value),
        }
    }
}

#[derive(Default)]
pub struct Extensions {
    slots: AHashMap<TypeId, Slot>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `value`, replacing an earlier value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.slots.insert(TypeId::of::<T>(), Slot::new(value));
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.slots.get(&TypeId::of::<T>())?.value.downcast_ref()
    }

    /// The attached `T`, attaching `T::default()` first when there is none.
    pub fn get_or_default<T: Default + Send + Sync + 'static>(&mut self) -> &mut T {
        let slot = self
            .slots
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Slot::new(T::default()));
        match slot.value.downcast_mut::<T>() {
            Some(value) => value,
            None => unreachable!("slot for {} holds {}", type_name::<T>(), slot.type_name),
        }
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.slots.values().map(|slot| slot.type_name))
            .finish()
    }
}
