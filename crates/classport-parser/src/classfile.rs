//! Raw classfile layout, read and written with binrw. Nothing here resolves constant pool indices.

use crate::constant_pool::{parse_constant_pool, write_constant_pool, ConstantPool};
use binrw::{BinRead, BinWrite};

pub const MAGIC: u32 = 0xCAFE_BABE;

/// Just enough of the file to reject unsupported versions before touching the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead)]
#[br(big, magic = b"\xca\xfe\xba\xbe")]
pub struct RawHeader {
    pub minor_version: u16,
    pub major_version: u16,
}

#[derive(Debug, Clone, PartialEq, BinRead, BinWrite)]
#[brw(big, magic = b"\xca\xfe\xba\xbe")]
pub struct RawClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool_count: u16,
    #[br(parse_with = parse_constant_pool, args(constant_pool_count))]
    #[bw(write_with = write_constant_pool)]
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces_count: u16,
    #[br(count = interfaces_count as usize)]
    pub interfaces: Vec<u16>,
    pub fields_count: u16,
    #[br(count = fields_count as usize)]
    pub fields: Vec<RawMember>,
    pub methods_count: u16,
    #[br(count = methods_count as usize)]
    pub methods: Vec<RawMember>,
    pub attributes_count: u16,
    #[br(count = attributes_count as usize)]
    pub attributes: Vec<RawAttribute>,
}

/// A `field_info` or `method_info`.
#[derive(Debug, Clone, PartialEq, BinRead, BinWrite)]
#[brw(big)]
pub struct RawMember {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes_count: u16,
    #[br(count = attributes_count as usize)]
    pub attributes: Vec<RawAttribute>,
}

#[derive(Debug, Clone, PartialEq, BinRead, BinWrite)]
#[brw(big)]
pub struct RawAttribute {
    pub name_index: u16,
    pub length: u32,
    #[br(count = length as usize)]
    pub info: Vec<u8>,
}

impl RawAttribute {
    pub fn new(name_index: u16, info: Vec<u8>) -> Self {
        Self {
            name_index,
            length: info.len() as u32,
            info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, BinRead, BinWrite)]
#[brw(big)]
pub struct RawCode {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_length: u32,
    #[br(count = code_length as usize)]
    pub code: Vec<u8>,
    pub exception_table_length: u16,
    #[br(count = exception_table_length as usize)]
    pub exception_table: Vec<RawHandler>,
    pub attributes_count: u16,
    #[br(count = attributes_count as usize)]
    pub attributes: Vec<RawAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(big)]
pub struct RawHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Zero catches everything.
    pub catch_type: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(big)]
pub struct RawExceptions {
    pub number_of_exceptions: u16,
    #[br(count = number_of_exceptions as usize)]
    pub exception_index_table: Vec<u16>,
}
