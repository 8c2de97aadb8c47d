//! Edge slot schemas for node kinds.
//!
//! Every node kind is described by a chain of [`Layer`]s, from the root
//! [`NODE`] layer down to the concrete kind. Each layer names the input and
//! successor slots it adds; a node's arity is the sum over its chain and a
//! slot's position is its ancestor layers' arity plus its index within the
//! declaring layer.
//!
//! All of this is `const` evaluated. Named positions such as
//! [`NEW_ARRAY_LENGTH`] are compile-time constants, and the assertions at the
//! bottom of this file reject a schema where a role appears twice along a
//! chain or where a descendant would move a slot its ancestor declared.
//!
//! ```text
//!  NODE
//!   └─ VALUE
//!       ├─ FLOATING ── CONSTANT, PARAMETER, VIRTUAL_OBJECT
//!       ├─ RETURN                               [result]
//!       └─ INSTRUCTION                          {next}
//!           ├─ START
//!           ├─ NEW_INSTANCE
//!           ├─ NEW_ARRAY                        [length]
//!           │   ├─ NEW_TYPE_ARRAY
//!           │   └─ NEW_OBJECT_ARRAY
//!           ├─ ACCESS_FIELD                     [object]
//!           │   ├─ LOAD_FIELD
//!           │   └─ STORE_FIELD                  [value]
//!           ├─ ACCESS_INDEXED                   [array, index]
//!           │   ├─ LOAD_INDEXED
//!           │   └─ STORE_INDEXED                [value]
//!           └─ ARRAY_LENGTH                     [array]
//! ```

use std::fmt;

// =============================================================================
// Slot Roles
// =============================================================================

/// Name of an input slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InputRole {
    /// Array length of an allocation.
    Length = 0,
    /// Receiver of a field access.
    Object = 1,
    /// Value written by a store.
    Value = 2,
    /// Array operand of an indexed access or length query.
    Array = 3,
    /// Element index of an indexed access.
    Index = 4,
    /// Returned value.
    Result = 5,
}

impl InputRole {
    /// Lower-case slot name used in dumps.
    pub const fn name(self) -> &'static str {
        match self {
            InputRole::Length => "length",
            InputRole::Object => "object",
            InputRole::Value => "value",
            InputRole::Array => "array",
            InputRole::Index => "index",
            InputRole::Result => "result",
        }
    }
}

impl fmt::Display for InputRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name of a successor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SuccessorRole {
    /// Next fixed instruction in control order.
    Next = 0,
}

impl SuccessorRole {
    /// Lower-case slot name used in dumps.
    pub const fn name(self) -> &'static str {
        match self {
            SuccessorRole::Next => "next",
        }
    }
}

impl fmt::Display for SuccessorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Layer
// =============================================================================

/// One level of the node schema hierarchy.
#[derive(Debug)]
pub struct Layer {
    /// Layer name, also the node kind name for concrete layers.
    pub name: &'static str,
    /// Enclosing layer, `None` only for [`NODE`].
    pub parent: Option<&'static Layer>,
    /// Input slots this layer adds after its ancestors'.
    pub inputs: &'static [InputRole],
    /// Successor slots this layer adds after its ancestors'.
    pub successors: &'static [SuccessorRole],
}

impl Layer {
    /// Number of input slots declared by the ancestors of this layer.
    pub const fn inherited_inputs(&self) -> usize {
        match self.parent {
            Some(parent) => parent.input_count(),
            None => 0,
        }
    }

    /// Number of successor slots declared by the ancestors of this layer.
    pub const fn inherited_successors(&self) -> usize {
        match self.parent {
            Some(parent) => parent.successor_count(),
            None => 0,
        }
    }

    /// Total input arity of a node built from this layer.
    pub const fn input_count(&self) -> usize {
        self.inherited_inputs() + self.inputs.len()
    }

    /// Total successor arity of a node built from this layer.
    pub const fn successor_count(&self) -> usize {
        self.inherited_successors() + self.successors.len()
    }

    /// Position of the input slot named `role`, searching up the chain.
    pub const fn input_position(&self, role: InputRole) -> Option<usize> {
        let mut i = 0;
        while i < self.inputs.len() {
            if self.inputs[i] as u8 == role as u8 {
                return Some(self.inherited_inputs() + i);
            }
            i += 1;
        }
        match self.parent {
            Some(parent) => parent.input_position(role),
            None => None,
        }
    }

    /// Position of the successor slot named `role`, searching up the chain.
    pub const fn successor_position(&self, role: SuccessorRole) -> Option<usize> {
        let mut i = 0;
        while i < self.successors.len() {
            if self.successors[i] as u8 == role as u8 {
                return Some(self.inherited_successors() + i);
            }
            i += 1;
        }
        match self.parent {
            Some(parent) => parent.successor_position(role),
            None => None,
        }
    }

    /// Role of the input slot at `position`.
    pub const fn input_role(&self, position: usize) -> Option<InputRole> {
        let base = self.inherited_inputs();
        if position >= base + self.inputs.len() {
            return None;
        }
        if position >= base {
            return Some(self.inputs[position - base]);
        }
        match self.parent {
            Some(parent) => parent.input_role(position),
            None => None,
        }
    }

    /// Role of the successor slot at `position`.
    pub const fn successor_role(&self, position: usize) -> Option<SuccessorRole> {
        let base = self.inherited_successors();
        if position >= base + self.successors.len() {
            return None;
        }
        if position >= base {
            return Some(self.successors[position - base]);
        }
        match self.parent {
            Some(parent) => parent.successor_role(position),
            None => None,
        }
    }

    /// Check whether `ancestor` appears on this layer's chain (itself included).
    ///
    /// Layer names are unique, and layers are `const` items that may be
    /// instantiated at several addresses, so identity is by name.
    pub fn extends(&self, ancestor: &Layer) -> bool {
        let mut layer = Some(self);
        while let Some(current) = layer {
            if current.name == ancestor.name {
                return true;
            }
            layer = current.parent;
        }
        false
    }

    /// Check that no role is declared twice along the chain.
    pub const fn is_well_formed(&self) -> bool {
        let mut i = 0;
        while i < self.inputs.len() {
            // The first hit for a role must be the slot declared here.
            match self.input_position(self.inputs[i]) {
                Some(pos) if pos == self.inherited_inputs() + i => {}
                _ => return false,
            }
            if let Some(parent) = self.parent {
                if parent.input_position(self.inputs[i]).is_some() {
                    return false;
                }
            }
            i += 1;
        }
        let mut j = 0;
        while j < self.successors.len() {
            if let Some(parent) = self.parent {
                if parent.successor_position(self.successors[j]).is_some() {
                    return false;
                }
            }
            let mut k = j + 1;
            while k < self.successors.len() {
                if self.successors[j] as u8 == self.successors[k] as u8 {
                    return false;
                }
                k += 1;
            }
            j += 1;
        }
        match self.parent {
            Some(parent) => parent.is_well_formed(),
            None => true,
        }
    }
}

// =============================================================================
// Layers
// =============================================================================

/// Root of every node kind.
pub const NODE: Layer = Layer {
    name: "Node",
    parent: None,
    inputs: &[],
    successors: &[],
};

/// Nodes that carry a result kind.
pub const VALUE: Layer = Layer {
    name: "Value",
    parent: Some(&NODE),
    inputs: &[],
    successors: &[],
};

/// Values not pinned to control order.
pub const FLOATING: Layer = Layer {
    name: "FloatingNode",
    parent: Some(&VALUE),
    inputs: &[],
    successors: &[],
};

/// Fixed instructions linked by a `next` successor.
pub const INSTRUCTION: Layer = Layer {
    name: "Instruction",
    parent: Some(&VALUE),
    inputs: &[],
    successors: &[SuccessorRole::Next],
};

pub const START: Layer = Layer {
    name: "Start",
    parent: Some(&INSTRUCTION),
    inputs: &[],
    successors: &[],
};

pub const RETURN: Layer = Layer {
    name: "Return",
    parent: Some(&VALUE),
    inputs: &[InputRole::Result],
    successors: &[],
};

pub const CONSTANT: Layer = Layer {
    name: "Constant",
    parent: Some(&FLOATING),
    inputs: &[],
    successors: &[],
};

pub const PARAMETER: Layer = Layer {
    name: "Parameter",
    parent: Some(&FLOATING),
    inputs: &[],
    successors: &[],
};

pub const NEW_INSTANCE: Layer = Layer {
    name: "NewInstance",
    parent: Some(&INSTRUCTION),
    inputs: &[],
    successors: &[],
};

/// Abstract base of array allocations.
pub const NEW_ARRAY: Layer = Layer {
    name: "NewArray",
    parent: Some(&INSTRUCTION),
    inputs: &[InputRole::Length],
    successors: &[],
};

pub const NEW_TYPE_ARRAY: Layer = Layer {
    name: "NewTypeArray",
    parent: Some(&NEW_ARRAY),
    inputs: &[],
    successors: &[],
};

pub const NEW_OBJECT_ARRAY: Layer = Layer {
    name: "NewObjectArray",
    parent: Some(&NEW_ARRAY),
    inputs: &[],
    successors: &[],
};

/// Abstract base of field accesses.
pub const ACCESS_FIELD: Layer = Layer {
    name: "AccessField",
    parent: Some(&INSTRUCTION),
    inputs: &[InputRole::Object],
    successors: &[],
};

pub const LOAD_FIELD: Layer = Layer {
    name: "LoadField",
    parent: Some(&ACCESS_FIELD),
    inputs: &[],
    successors: &[],
};

pub const STORE_FIELD: Layer = Layer {
    name: "StoreField",
    parent: Some(&ACCESS_FIELD),
    inputs: &[InputRole::Value],
    successors: &[],
};

/// Abstract base of array element accesses.
pub const ACCESS_INDEXED: Layer = Layer {
    name: "AccessIndexed",
    parent: Some(&INSTRUCTION),
    inputs: &[InputRole::Array, InputRole::Index],
    successors: &[],
};

pub const LOAD_INDEXED: Layer = Layer {
    name: "LoadIndexed",
    parent: Some(&ACCESS_INDEXED),
    inputs: &[],
    successors: &[],
};

pub const STORE_INDEXED: Layer = Layer {
    name: "StoreIndexed",
    parent: Some(&ACCESS_INDEXED),
    inputs: &[InputRole::Value],
    successors: &[],
};

pub const ARRAY_LENGTH: Layer = Layer {
    name: "ArrayLength",
    parent: Some(&INSTRUCTION),
    inputs: &[InputRole::Array],
    successors: &[],
};

/// Escape-analysis stand-in for a removed allocation.
pub const VIRTUAL_OBJECT: Layer = Layer {
    name: "VirtualObject",
    parent: Some(&FLOATING),
    inputs: &[],
    successors: &[],
};

// =============================================================================
// Named Positions
// =============================================================================

const fn input_at(layer: &Layer, role: InputRole) -> usize {
    match layer.input_position(role) {
        Some(pos) => pos,
        None => panic!("layer does not declare the requested input role"),
    }
}

const fn successor_at(layer: &Layer, role: SuccessorRole) -> usize {
    match layer.successor_position(role) {
        Some(pos) => pos,
        None => panic!("layer does not declare the requested successor role"),
    }
}

/// `next` successor of every fixed instruction.
pub const INSTRUCTION_NEXT: usize = successor_at(&INSTRUCTION, SuccessorRole::Next);
/// `length` input of every array allocation.
pub const NEW_ARRAY_LENGTH: usize = input_at(&NEW_ARRAY, InputRole::Length);
/// `object` input of every field access.
pub const ACCESS_FIELD_OBJECT: usize = input_at(&ACCESS_FIELD, InputRole::Object);
/// `value` input of a field store.
pub const STORE_FIELD_VALUE: usize = input_at(&STORE_FIELD, InputRole::Value);
/// `array` input of every indexed access.
pub const ACCESS_INDEXED_ARRAY: usize = input_at(&ACCESS_INDEXED, InputRole::Array);
/// `index` input of every indexed access.
pub const ACCESS_INDEXED_INDEX: usize = input_at(&ACCESS_INDEXED, InputRole::Index);
/// `value` input of an indexed store.
pub const STORE_INDEXED_VALUE: usize = input_at(&STORE_INDEXED, InputRole::Value);
/// `array` input of an array length query.
pub const ARRAY_LENGTH_ARRAY: usize = input_at(&ARRAY_LENGTH, InputRole::Array);
/// `result` input of a return.
pub const RETURN_RESULT: usize = input_at(&RETURN, InputRole::Result);

// =============================================================================
// Compile-time Checks
// =============================================================================

/// Every layer of the hierarchy; all must be well formed.
pub const ALL_LAYERS: [&Layer; 20] = [
    &NODE,
    &VALUE,
    &FLOATING,
    &INSTRUCTION,
    &START,
    &RETURN,
    &CONSTANT,
    &PARAMETER,
    &NEW_INSTANCE,
    &NEW_TYPE_ARRAY,
    &NEW_OBJECT_ARRAY,
    &LOAD_FIELD,
    &STORE_FIELD,
    &LOAD_INDEXED,
    &STORE_INDEXED,
    &ARRAY_LENGTH,
    &VIRTUAL_OBJECT,
    &NEW_ARRAY,
    &ACCESS_FIELD,
    &ACCESS_INDEXED,
];

const fn all_well_formed() -> bool {
    let mut i = 0;
    while i < ALL_LAYERS.len() {
        if !ALL_LAYERS[i].is_well_formed() {
            return false;
        }
        i += 1;
    }
    true
}

const fn same_position(a: Option<usize>, b: usize) -> bool {
    matches!(a, Some(pos) if pos == b)
}

const _: () = assert!(all_well_formed());

// Concrete kinds must see their ancestors' slots where the ancestor put them.
const _: () = assert!(same_position(
    NEW_TYPE_ARRAY.input_position(InputRole::Length),
    NEW_ARRAY_LENGTH
));
const _: () = assert!(same_position(
    NEW_OBJECT_ARRAY.input_position(InputRole::Length),
    NEW_ARRAY_LENGTH
));
const _: () = assert!(same_position(
    STORE_FIELD.input_position(InputRole::Object),
    ACCESS_FIELD_OBJECT
));
const _: () = assert!(same_position(
    STORE_INDEXED.input_position(InputRole::Index),
    ACCESS_INDEXED_INDEX
));
const _: () = assert!(same_position(
    NEW_TYPE_ARRAY.successor_position(SuccessorRole::Next),
    INSTRUCTION_NEXT
));

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_is_cumulative() {
        assert_eq!(NODE.input_count(), 0);
        assert_eq!(INSTRUCTION.successor_count(), 1);

        assert_eq!(NEW_ARRAY.inherited_inputs(), INSTRUCTION.input_count());
        assert_eq!(NEW_ARRAY.input_count(), INSTRUCTION.input_count() + 1);
        assert_eq!(NEW_ARRAY.successor_count(), INSTRUCTION.successor_count());

        assert_eq!(NEW_TYPE_ARRAY.input_count(), NEW_ARRAY.input_count());
        assert_eq!(STORE_FIELD.input_count(), 2);
        assert_eq!(STORE_INDEXED.input_count(), 3);
        assert_eq!(VIRTUAL_OBJECT.input_count(), 0);
        assert_eq!(VIRTUAL_OBJECT.successor_count(), 0);
    }

    #[test]
    fn test_named_positions() {
        assert_eq!(NEW_ARRAY_LENGTH, 0);
        assert_eq!(INSTRUCTION_NEXT, 0);
        assert_eq!(STORE_FIELD_VALUE, 1);
        assert_eq!(ACCESS_INDEXED_INDEX, 1);
        assert_eq!(STORE_INDEXED_VALUE, 2);
    }

    #[test]
    fn test_role_lookup_round_trips() {
        for layer in ALL_LAYERS {
            for pos in 0..layer.input_count() {
                let role = layer.input_role(pos).expect("role for in-range slot");
                assert_eq!(layer.input_position(role), Some(pos), "{}", layer.name);
            }
            assert_eq!(layer.input_role(layer.input_count()), None);
            assert_eq!(layer.successor_role(layer.successor_count()), None);
        }
    }

    #[test]
    fn test_missing_role() {
        assert_eq!(LOAD_FIELD.input_position(InputRole::Value), None);
        assert_eq!(RETURN.successor_position(SuccessorRole::Next), None);
    }

    #[test]
    fn test_extends() {
        assert!(NEW_TYPE_ARRAY.extends(&NEW_ARRAY));
        assert!(NEW_TYPE_ARRAY.extends(&INSTRUCTION));
        assert!(!VIRTUAL_OBJECT.extends(&INSTRUCTION));
        assert!(VIRTUAL_OBJECT.extends(&FLOATING));
    }

    #[test]
    fn test_duplicate_role_is_rejected() {
        const BROKEN: Layer = Layer {
            name: "Broken",
            parent: Some(&NEW_ARRAY),
            inputs: &[InputRole::Length],
            successors: &[],
        };
        assert!(!BROKEN.is_well_formed());
    }
}
