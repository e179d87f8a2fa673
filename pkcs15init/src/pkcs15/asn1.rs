// Copyright 2017 Axel Rasmussen
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! DER helpers for the universal types PKCS#15 structures use. Tag and
//! length handling is delegated to `iso7816_tlv`'s BER-TLV codec; this
//! module only knows how the contents of each type are laid out.

use crate::error::*;
use crate::util::*;
use iso7816_tlv::ber::{Tag, Tlv, Value};

pub const BOOLEAN: u8 = 0x01;
pub const INTEGER: u8 = 0x02;
pub const BIT_STRING: u8 = 0x03;
pub const OCTET_STRING: u8 = 0x04;
pub const ENUMERATED: u8 = 0x0a;
pub const UTF8_STRING: u8 = 0x0c;
pub const GENERALIZED_TIME: u8 = 0x18;
pub const SEQUENCE: u8 = 0x30;

const CONSTRUCTED: u8 = 0x20;

/// The identifier octet of a primitive, context-specific tag.
pub const fn context(number: u8) -> u8 {
    0x80 | number
}

/// The identifier octet of a constructed, context-specific tag.
pub const fn context_constructed(number: u8) -> u8 {
    0x80 | CONSTRUCTED | number
}

pub fn tag(identifier: u8) -> Result<Tag> {
    Ok(Tag::try_from(identifier)?)
}

pub fn has_tag(tlv: &Tlv, identifier: u8) -> Result<bool> {
    Ok(tlv.tag() == &tag(identifier)?)
}

pub fn primitive(identifier: u8, body: Vec<u8>) -> Result<Tlv> {
    Ok(Tlv::new(tag(identifier)?, Value::Primitive(body))?)
}

pub fn constructed(identifier: u8, elements: Vec<Tlv>) -> Result<Tlv> {
    Ok(Tlv::new(tag(identifier)?, Value::Constructed(elements))?)
}

/// Encode the given big-endian magnitude as a non-negative INTEGER body.
pub fn unsigned_integer_body(magnitude: &[u8]) -> Vec<u8> {
    let skip = magnitude.iter().take_while(|b| **b == 0).count();
    let magnitude = &magnitude[skip..];
    let mut body = Vec::with_capacity(magnitude.len() + 1);
    if magnitude.first().map_or(true, |b| *b & 0x80 != 0) {
        body.push(0);
    }
    body.extend_from_slice(magnitude);
    body
}

pub fn unsigned(identifier: u8, value: u64) -> Result<Tlv> {
    primitive(identifier, unsigned_integer_body(&value.to_be_bytes()))
}

pub fn integer(value: u64) -> Result<Tlv> {
    unsigned(INTEGER, value)
}

/// An INTEGER too large for `u64`, such as a DSA public value.
pub fn big_integer(magnitude: &[u8]) -> Result<Tlv> {
    primitive(INTEGER, unsigned_integer_body(magnitude))
}

pub fn boolean(value: bool) -> Result<Tlv> {
    primitive(BOOLEAN, vec![if value { 0xff } else { 0x00 }])
}

pub fn octet_string(value: &[u8]) -> Result<Tlv> {
    primitive(OCTET_STRING, value.to_vec())
}

pub fn utf8_string(identifier: u8, value: &str) -> Result<Tlv> {
    primitive(identifier, value.as_bytes().to_vec())
}

/// The body of a named bit list, where bit `n` of `bits` is the standard's
/// bit number `n`. DER requires trailing zero bits to be dropped.
pub fn bit_string_body(bits: u32) -> Vec<u8> {
    if bits == 0 {
        return vec![0];
    }
    let highest = 31 - bits.leading_zeros() as usize;
    let byte_count = highest / 8 + 1;
    let mut body = vec![0; byte_count + 1];
    body[0] = (7 - highest % 8) as u8;
    for bit in 0..=highest {
        if bits & (1u32 << bit) != 0 {
            body[1 + bit / 8] |= 0x80u8 >> (bit % 8);
        }
    }
    body
}

pub fn bit_string(bits: u32) -> Result<Tlv> {
    primitive(BIT_STRING, bit_string_body(bits))
}

pub fn decode_unsigned(body: &[u8]) -> Result<u64> {
    if body.is_empty() {
        return Err(Error::Decode("empty INTEGER".to_owned()));
    }
    if body[0] & 0x80 != 0 {
        return Err(Error::Decode("unexpected negative INTEGER".to_owned()));
    }
    let skip = body.iter().take_while(|b| **b == 0).count();
    let magnitude = &body[skip..];
    if magnitude.len() > 8 {
        return Err(Error::Decode(format!(
            "a {} byte INTEGER is too large",
            magnitude.len()
        )));
    }
    Ok(magnitude.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
}

/// The inverse of `bit_string_body`. Bits past the 32nd are ignored.
pub fn decode_bit_string(body: &[u8]) -> Result<u32> {
    let unused = get_required(body, 0)?;
    if unused > 7 || (body.len() == 1 && unused != 0) {
        return Err(Error::Decode(format!(
            "invalid BIT STRING with {} unused bits",
            unused
        )));
    }
    let mut bits = 0u32;
    for (index, byte) in body[1..].iter().enumerate().take(4) {
        for offset in 0..8 {
            if byte & (0x80u8 >> offset) != 0 {
                bits |= 1u32 << (index * 8 + offset);
            }
        }
    }
    Ok(bits)
}

pub fn decode_boolean(body: &[u8]) -> Result<bool> {
    match body {
        [0x00] => Ok(false),
        [0xff] => Ok(true),
        _ => Err(Error::Decode("invalid BOOLEAN".to_owned())),
    }
}

pub fn primitive_body(tlv: &Tlv) -> Result<&[u8]> {
    match tlv.value() {
        Value::Primitive(body) => Ok(body.as_slice()),
        Value::Constructed(_) => Err(Error::Decode(format!(
            "expected a primitive value for tag {:?}",
            tlv.tag()
        ))),
    }
}

pub fn children(tlv: &Tlv) -> Result<&[Tlv]> {
    match tlv.value() {
        Value::Constructed(elements) => Ok(elements.as_slice()),
        Value::Primitive(_) => Err(Error::Decode(format!(
            "expected a constructed value for tag {:?}",
            tlv.tag()
        ))),
    }
}

/// Split the records stored in a card file, returning each next to the
/// exact bytes it was parsed from. Card files are usually larger than their
/// contents, and are padded with 0x00 or 0xFF bytes, neither of which is a
/// valid tag here.
pub fn split_records(mut data: &[u8]) -> Result<Vec<(Tlv, &[u8])>> {
    let mut records = Vec::new();
    while let Some(first) = data.first() {
        if *first == 0x00 || *first == 0xff {
            break;
        }
        let (tlv, rest) = Tlv::parse(data);
        let tlv = tlv?;
        let consumed = data.len() - rest.len();
        records.push((tlv, &data[..consumed]));
        data = rest;
    }
    Ok(records)
}

/// A cursor over the elements of a constructed value.
pub struct Elements<'a> {
    elements: &'a [Tlv],
}

impl<'a> Elements<'a> {
    pub fn new(elements: &'a [Tlv]) -> Self {
        Elements { elements }
    }

    /// A cursor over the contents of the given constructed value.
    pub fn of(tlv: &'a Tlv) -> Result<Self> {
        Ok(Elements::new(children(tlv)?))
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn next_has_tag(&self, identifier: u8) -> Result<bool> {
        match self.elements.first() {
            None => Ok(false),
            Some(tlv) => has_tag(tlv, identifier),
        }
    }

    /// Read the next element if it has the given tag.
    pub fn read_optional(&mut self, identifier: u8) -> Result<Option<&'a Tlv>> {
        if !self.next_has_tag(identifier)? {
            return Ok(None);
        }
        let (first, rest) = match self.elements.split_first() {
            Some(split) => split,
            None => return Ok(None),
        };
        self.elements = rest;
        Ok(Some(first))
    }

    /// Read the next element, which must have the given tag.
    pub fn read(&mut self, identifier: u8) -> Result<&'a Tlv> {
        match self.read_optional(identifier)? {
            Some(tlv) => Ok(tlv),
            None => Err(Error::Decode(match self.elements.first() {
                Some(found) => format!(
                    "expected tag {:#04x}, found {:?}",
                    identifier,
                    found.tag()
                ),
                None => format!("expected tag {:#04x}, found end of data", identifier),
            })),
        }
    }

    pub fn read_primitive(&mut self, identifier: u8) -> Result<&'a [u8]> {
        primitive_body(self.read(identifier)?)
    }

    pub fn read_optional_primitive(&mut self, identifier: u8) -> Result<Option<&'a [u8]>> {
        self.read_optional(identifier)?
            .map(primitive_body)
            .transpose()
    }

    pub fn read_unsigned(&mut self, identifier: u8) -> Result<u64> {
        decode_unsigned(self.read_primitive(identifier)?)
    }

    pub fn read_optional_unsigned(&mut self, identifier: u8) -> Result<Option<u64>> {
        self.read_optional_primitive(identifier)?
            .map(decode_unsigned)
            .transpose()
    }

    pub fn read_bit_string(&mut self) -> Result<u32> {
        decode_bit_string(self.read_primitive(BIT_STRING)?)
    }

    pub fn read_optional_bit_string(&mut self) -> Result<Option<u32>> {
        self.read_optional_primitive(BIT_STRING)?
            .map(decode_bit_string)
            .transpose()
    }

    pub fn read_optional_utf8(&mut self, identifier: u8) -> Result<Option<String>> {
        Ok(match self.read_optional_primitive(identifier)? {
            None => None,
            Some(body) => Some(String::from_utf8(body.to_vec())?),
        })
    }

    /// Read the next element, which must be constructed with the given tag,
    /// returning a cursor over its contents.
    pub fn enter(&mut self, identifier: u8) -> Result<Elements<'a>> {
        Elements::of(self.read(identifier)?)
    }
}
