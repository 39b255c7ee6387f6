/*! Tagged object heap.
 *
 * Objects live in a slab indexed by [`ObjRef`]. Arrays record their full type, dimensionality and
 * per-element byte size (0 for reference elements); primitive elements are packed at that width
 * and every access is bounds-checked before it touches storage. Collection is a plain mark and
 * sweep over explicit roots.
 */

use crate::unwind::{Fault, Flow};
use crate::value::{ObjRef, Value};
use crate::{Result, RuntimeError};
use classport_core::codegen::runtime_contract as rc;
use classport_core::{JavaType, ValueKind};
use std::collections::HashSet;
use tracing::debug;

/// Allocation shape of an instance: its class and the kind of every field slot, inherited first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub name: String,
    pub field_kinds: Vec<ValueKind>,
}

impl TypeDescriptor {
    pub fn new(name: &str, field_kinds: Vec<ValueKind>) -> Self {
        Self {
            name: name.to_string(),
            field_kinds,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ArrayStorage {
    Packed(Vec<u8>),
    Refs(Vec<Option<ObjRef>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayData {
    /// Full array type, e.g. `[[I` for an int matrix.
    pub ty: JavaType,
    element: JavaType,
    pub length: u32,
    pub dims: u8,
    /// Bytes per element; 0 when elements are references.
    pub elem_size: u8,
    storage: ArrayStorage,
}

impl ArrayData {
    fn new(ty: JavaType, length: u32) -> Self {
        let element = ty.component().unwrap_or(JavaType::Int);
        let dims = match &ty {
            JavaType::Array { dims, .. } => *dims,
            _ => 1,
        };
        let elem_size = element.primitive_size();
        let storage = if elem_size == 0 {
            ArrayStorage::Refs(vec![None; length as usize])
        } else {
            ArrayStorage::Packed(vec![0; length as usize * elem_size as usize])
        };
        Self {
            ty,
            element,
            length,
            dims,
            elem_size,
            storage,
        }
    }

    pub fn element_type(&self) -> &JavaType {
        &self.element
    }

    fn check(&self, index: i32) -> Flow<usize> {
        if index < 0 || index as u32 >= self.length {
            return Err(Fault::ArrayIndexOutOfBounds {
                index,
                length: self.length,
            }
            .into());
        }
        Ok(index as usize)
    }

    pub fn load(&self, index: i32) -> Flow<Value> {
        let i = self.check(index)?;
        let bytes = match &self.storage {
            ArrayStorage::Refs(refs) => return Ok(Value::Ref(refs[i])),
            ArrayStorage::Packed(bytes) => bytes,
        };
        let size = self.elem_size as usize;
        let at = &bytes[i * size..(i + 1) * size];
        let value = match self.element {
            JavaType::Boolean | JavaType::Byte => Value::Int(i32::from(at[0] as i8)),
            JavaType::Char => Value::Int(i32::from(u16::from_le_bytes([at[0], at[1]]))),
            JavaType::Short => Value::Int(i32::from(i16::from_le_bytes([at[0], at[1]]))),
            JavaType::Int => Value::Int(i32::from_le_bytes([at[0], at[1], at[2], at[3]])),
            JavaType::Float => Value::Float(f32::from_le_bytes([at[0], at[1], at[2], at[3]])),
            JavaType::Long => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(at);
                Value::Long(i64::from_le_bytes(raw))
            }
            JavaType::Double => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(at);
                Value::Double(f64::from_le_bytes(raw))
            }
            JavaType::Void | JavaType::Object(_) | JavaType::Array { .. } => {
                return Err(RuntimeError::TypeMismatch {
                    expected: ValueKind::Ref,
                    found: ValueKind::Int,
                }
                .into())
            }
        };
        Ok(value)
    }

    /// Stores `value`, truncating ints to the element width.
    pub fn store(&mut self, index: i32, value: Value) -> Flow<()> {
        let i = self.check(index)?;
        let size = self.elem_size as usize;
        let bytes = match &mut self.storage {
            ArrayStorage::Refs(refs) => {
                refs[i] = value.as_ref()?;
                return Ok(());
            }
            ArrayStorage::Packed(bytes) => &mut bytes[i * size..(i + 1) * size],
        };
        match self.element {
            JavaType::Boolean | JavaType::Byte => bytes[0] = value.as_int()? as u8,
            JavaType::Char | JavaType::Short => {
                bytes.copy_from_slice(&(value.as_int()? as u16).to_le_bytes())
            }
            JavaType::Int => bytes.copy_from_slice(&value.as_int()?.to_le_bytes()),
            JavaType::Float => bytes.copy_from_slice(&value.as_float()?.to_le_bytes()),
            JavaType::Long => bytes.copy_from_slice(&value.as_long()?.to_le_bytes()),
            JavaType::Double => bytes.copy_from_slice(&value.as_double()?.to_le_bytes()),
            JavaType::Void | JavaType::Object(_) | JavaType::Array { .. } => {}
        }
        Ok(())
    }

    fn references(&self) -> impl Iterator<Item = ObjRef> + '_ {
        let refs: &[Option<ObjRef>] = match &self.storage {
            ArrayStorage::Refs(refs) => refs,
            ArrayStorage::Packed(_) => &[],
        };
        refs.iter().flatten().copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectBody {
    Fields(Vec<Value>),
    Array(ArrayData),
    Str(String),
    /// The class object standing for a class literal or a static method's monitor.
    Class(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeapObject {
    /// Class name; `java/lang/Object` for arrays, whose precise type is in the body.
    pub class: String,
    pub body: ObjectBody,
    marked: bool,
}

impl HeapObject {
    pub fn array(&self) -> Option<&ArrayData> {
        match &self.body {
            ObjectBody::Array(array) => Some(array),
            _ => None,
        }
    }

    /// The static type used for cast and instance checks.
    pub fn java_type(&self) -> JavaType {
        match &self.body {
            ObjectBody::Array(array) => array.ty.clone(),
            _ => JavaType::object(&self.class),
        }
    }
}

#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Option<HeapObject>>,
    free: Vec<u32>,
    live: usize,
    allocated: u64,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, class: &str, body: ObjectBody) -> ObjRef {
        let object = HeapObject {
            class: class.to_string(),
            body,
            marked: false,
        };
        self.live += 1;
        self.allocated += 1;
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(object);
                ObjRef(index)
            }
            None => {
                self.slots.push(Some(object));
                ObjRef(self.slots.len() as u32 - 1)
            }
        }
    }

    /// Allocates a zero-initialised instance tagged with `descriptor`.
    pub fn allocate(&mut self, descriptor: &TypeDescriptor) -> ObjRef {
        let fields = descriptor.field_kinds.iter().map(|k| Value::zero(*k)).collect();
        self.insert(&descriptor.name, ObjectBody::Fields(fields))
    }

    pub fn alloc_string(&mut self, text: &str) -> ObjRef {
        self.insert(rc::STRING, ObjectBody::Str(text.to_string()))
    }

    pub fn alloc_class_object(&mut self, class: &str) -> ObjRef {
        self.insert("java/lang/Class", ObjectBody::Class(class.to_string()))
    }

    /// One-dimensional array of `element`.
    pub fn alloc_array(&mut self, element: &JavaType, length: i32) -> Flow<ObjRef> {
        self.alloc_multi(&JavaType::array_of(element.clone(), 1), &[length])
    }

    /// `ty` must have at least two dimensions. Both levels are allocated eagerly.
    pub fn alloc_2d(&mut self, ty: &JavaType, outer: i32, inner: i32) -> Flow<ObjRef> {
        self.alloc_multi(ty, &[outer, inner])
    }

    /// Allocates the first `lengths.len()` levels of `ty`; deeper levels stay null.
    pub fn alloc_multi(&mut self, ty: &JavaType, lengths: &[i32]) -> Flow<ObjRef> {
        if let Some(negative) = lengths.iter().find(|l| **l < 0) {
            return Err(Fault::NegativeArraySize(*negative).into());
        }
        Ok(self.alloc_levels(ty, lengths))
    }

    fn alloc_levels(&mut self, ty: &JavaType, lengths: &[i32]) -> ObjRef {
        let length = lengths.first().copied().unwrap_or(0) as u32;
        let mut array = ArrayData::new(ty.clone(), length);
        if lengths.len() > 1 {
            if let Some(component) = ty.component() {
                let inner: Vec<Option<ObjRef>> = (0..length)
                    .map(|_| Some(self.alloc_levels(&component, &lengths[1..])))
                    .collect();
                array.storage = ArrayStorage::Refs(inner);
            }
        }
        self.insert(rc::OBJECT, ObjectBody::Array(array))
    }

    pub fn get(&self, obj: ObjRef) -> Result<&HeapObject> {
        self.slots
            .get(obj.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(RuntimeError::DanglingObject(obj))
    }

    pub fn get_mut(&mut self, obj: ObjRef) -> Result<&mut HeapObject> {
        self.slots
            .get_mut(obj.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(RuntimeError::DanglingObject(obj))
    }

    pub fn contains(&self, obj: ObjRef) -> bool {
        self.get(obj).is_ok()
    }

    pub fn class_of(&self, obj: ObjRef) -> Result<&str> {
        Ok(&self.get(obj)?.class)
    }

    pub fn array(&self, obj: ObjRef) -> Result<&ArrayData> {
        self.get(obj)?.array().ok_or(RuntimeError::WrongObjectKind {
            obj,
            expected: "an array",
        })
    }

    pub fn array_mut(&mut self, obj: ObjRef) -> Result<&mut ArrayData> {
        match &mut self.get_mut(obj)?.body {
            ObjectBody::Array(array) => Ok(array),
            _ => Err(RuntimeError::WrongObjectKind {
                obj,
                expected: "an array",
            }),
        }
    }

    pub fn string(&self, obj: ObjRef) -> Result<&str> {
        match &self.get(obj)?.body {
            ObjectBody::Str(text) => Ok(text),
            _ => Err(RuntimeError::WrongObjectKind {
                obj,
                expected: "a string",
            }),
        }
    }

    fn fields_mut(&mut self, obj: ObjRef) -> Result<&mut Vec<Value>> {
        match &mut self.get_mut(obj)?.body {
            ObjectBody::Fields(fields) => Ok(fields),
            _ => Err(RuntimeError::WrongObjectKind {
                obj,
                expected: "an instance",
            }),
        }
    }

    pub fn field(&self, obj: ObjRef, index: usize) -> Result<Value> {
        let fields = match &self.get(obj)?.body {
            ObjectBody::Fields(fields) => fields,
            _ => {
                return Err(RuntimeError::WrongObjectKind {
                    obj,
                    expected: "an instance",
                })
            }
        };
        fields.get(index).copied().ok_or(RuntimeError::WrongObjectKind {
            obj,
            expected: "an instance with that field",
        })
    }

    pub fn set_field(&mut self, obj: ObjRef, index: usize, value: Value) -> Result<()> {
        let slot = self
            .fields_mut(obj)?
            .get_mut(index)
            .ok_or(RuntimeError::WrongObjectKind {
                obj,
                expected: "an instance with that field",
            })?;
        *slot = value;
        Ok(())
    }

    /// `array[outer][inner]` on a two-dimensional array; each level is checked before it is read.
    pub fn load_2d(&self, obj: ObjRef, outer: i32, inner: i32) -> Flow<Value> {
        let row = self.array(obj)?.load(outer)?.as_ref()?.ok_or(Fault::NullPointer)?;
        self.array(row)?.load(inner)
    }

    pub fn store_2d(&mut self, obj: ObjRef, outer: i32, inner: i32, value: Value) -> Flow<()> {
        let row = self.array(obj)?.load(outer)?.as_ref()?.ok_or(Fault::NullPointer)?;
        self.array_mut(row)?.store(inner, value)
    }

    pub fn free(&mut self, obj: ObjRef) {
        if let Some(slot) = self.slots.get_mut(obj.0 as usize) {
            if slot.take().is_some() {
                self.live -= 1;
                self.free.push(obj.0);
            }
        }
    }

    pub fn live(&self) -> usize {
        self.live
    }

    pub fn allocated(&self) -> u64 {
        self.allocated
    }

    /// Marks from `roots` and frees everything unmarked. Returns the freed references.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = ObjRef>) -> Vec<ObjRef> {
        let mut work: Vec<ObjRef> = roots.into_iter().collect();
        let mut seen = HashSet::new();
        while let Some(obj) = work.pop() {
            if !seen.insert(obj) {
                continue;
            }
            let Some(Some(object)) = self.slots.get_mut(obj.0 as usize) else {
                continue;
            };
            object.marked = true;
            match &object.body {
                ObjectBody::Fields(fields) => work.extend(fields.iter().filter_map(Value::reference)),
                ObjectBody::Array(array) => work.extend(array.references()),
                ObjectBody::Str(_) | ObjectBody::Class(_) => {}
            }
        }

        let mut freed = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            match slot {
                Some(object) if object.marked => object.marked = false,
                Some(_) => freed.push(ObjRef(index as u32)),
                None => {}
            }
        }
        for obj in &freed {
            self.free(*obj);
        }
        debug!(freed = freed.len(), live = self.live, "heap swept");
        freed
    }
}
