//! Java class file decoding.
//!
//! Reads just enough of the class file format to recover the class name,
//! the super class, and the implemented interfaces: magic, constant pool,
//! access flags, this/super indices, interface list. Everything after the
//! interface list is ignored.

use std::collections::HashMap;

use crate::error::JardexError;

/// Inheritance facts decoded from one compiled class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    /// Dotted fully qualified name, e.g. `com.example.Foo`.
    pub class_name: String,
    /// Dotted super class name; `None` for `java.lang.Object` itself
    /// (super index 0). `java.lang.Object` as a parent is NOT filtered
    /// here; the indexer drops it when emitting edges.
    pub super_class: Option<String>,
    /// Dotted names of directly implemented interfaces.
    pub interfaces: Vec<String>,
}

const MAGIC: u32 = 0xCAFE_BABE;

/// Decode inheritance facts from class file bytes.
///
/// Fails with [`JardexError::MalformedClass`] on a bad magic number, an
/// unrecognized constant pool tag, or truncated input.
pub fn read_class(bytes: &[u8]) -> Result<ClassInfo, JardexError> {
    let mut r = Reader::new(bytes);

    if r.u32()? != MAGIC {
        return Err(JardexError::MalformedClass("bad magic number".to_string()));
    }
    r.skip(4)?; // minor + major version

    let cp_count = r.u16()? as usize;
    let mut utf8: HashMap<usize, String> = HashMap::new();
    let mut class_name_index: HashMap<usize, usize> = HashMap::new();

    // Constant pool indices are 1-based; Long and Double take two slots.
    let mut index = 1usize;
    while index < cp_count {
        let tag = r.u8()?;
        match tag {
            // CONSTANT_Utf8
            1 => {
                let len = r.u16()? as usize;
                let raw = r.take(len)?;
                utf8.insert(index, String::from_utf8_lossy(raw).into_owned());
            }
            // CONSTANT_Integer, CONSTANT_Float
            3 | 4 => r.skip(4)?,
            // CONSTANT_Long, CONSTANT_Double occupy two logical indices
            5 | 6 => {
                r.skip(8)?;
                index += 1;
            }
            // CONSTANT_Class
            7 => {
                let name_index = r.u16()? as usize;
                class_name_index.insert(index, name_index);
            }
            // CONSTANT_String, CONSTANT_MethodType, CONSTANT_Module,
            // CONSTANT_Package
            8 | 16 | 19 | 20 => r.skip(2)?,
            // CONSTANT_Fieldref, CONSTANT_Methodref,
            // CONSTANT_InterfaceMethodref, CONSTANT_NameAndType,
            // CONSTANT_Dynamic, CONSTANT_InvokeDynamic
            9 | 10 | 11 | 12 | 17 | 18 => r.skip(4)?,
            // CONSTANT_MethodHandle
            15 => r.skip(3)?,
            other => {
                return Err(JardexError::MalformedClass(format!(
                    "unrecognized constant pool tag {other} at index {index}"
                )));
            }
        }
        index += 1;
    }

    r.skip(2)?; // access flags
    let this_index = r.u16()? as usize;
    let super_index = r.u16()? as usize;

    let resolve = |class_index: usize| -> Result<String, JardexError> {
        let name_index = class_name_index.get(&class_index).ok_or_else(|| {
            JardexError::MalformedClass(format!("constant {class_index} is not a Class entry"))
        })?;
        let name = utf8.get(name_index).ok_or_else(|| {
            JardexError::MalformedClass(format!("class name index {name_index} is not Utf8"))
        })?;
        Ok(name.replace('/', "."))
    };

    let class_name = resolve(this_index)?;
    let super_class = if super_index == 0 {
        None
    } else {
        Some(resolve(super_index)?)
    };

    let interface_count = r.u16()? as usize;
    let mut interfaces = Vec::with_capacity(interface_count);
    for _ in 0..interface_count {
        interfaces.push(resolve(r.u16()? as usize)?);
    }

    Ok(ClassInfo {
        class_name,
        super_class,
        interfaces,
    })
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], JardexError> {
        let end = self.pos.checked_add(n).filter(|e| *e <= self.bytes.len());
        match end {
            Some(end) => {
                let slice = &self.bytes[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(JardexError::MalformedClass(format!(
                "truncated at offset {}",
                self.pos
            ))),
        }
    }

    fn skip(&mut self, n: usize) -> Result<(), JardexError> {
        self.take(n).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8, JardexError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, JardexError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, JardexError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}
