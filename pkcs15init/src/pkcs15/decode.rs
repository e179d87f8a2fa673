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

use crate::card::path::Path;
use crate::error::*;
use crate::pkcs15::asn1::*;
use crate::pkcs15::encode::*;
use crate::pkcs15::*;
use iso7816_tlv::ber::Tlv;
use log::warn;

/// One record of a directory file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DirectoryRecord {
    Object(Pkcs15Object),
    /// A record of a type this crate doesn't model (an EC key, say), kept as
    /// the DER it was read as so rewriting the file preserves it.
    Opaque(Vec<u8>),
}

fn decode_path(elements: &mut Elements) -> Result<Path> {
    Path::new(elements.enter(SEQUENCE)?.read_primitive(OCTET_STRING)?)
}

fn decode_common_attributes(elements: &mut Elements) -> Result<CommonAttributes> {
    let mut common = elements.enter(SEQUENCE)?;
    let label = common.read_optional_utf8(UTF8_STRING)?.unwrap_or_default();
    let flags = ObjectFlags(common.read_optional_bit_string()?.unwrap_or(0));
    let auth_id = match common.read_optional_primitive(OCTET_STRING)? {
        None => None,
        Some(id) => Some(Pkcs15Id::new(id)?),
    };
    Ok(CommonAttributes {
        label,
        flags,
        auth_id,
    })
}

fn decode_key_object(object_type: ObjectType, record: &Tlv) -> Result<Pkcs15Object> {
    let mut elements = Elements::of(record)?;
    let common = decode_common_attributes(&mut elements)?;

    let mut key = elements.enter(SEQUENCE)?;
    let id = Pkcs15Id::new(key.read_primitive(OCTET_STRING)?)?;
    let usage = KeyUsage(key.read_bit_string()?);
    let native = match key.read_optional_primitive(BOOLEAN)? {
        None => true,
        Some(body) => decode_boolean(body)?,
    };
    let access_flags = AccessFlags(key.read_optional_bit_string()?.unwrap_or(0));
    let key_reference = key.read_optional_unsigned(INTEGER)?.map(|r| r as u32);

    elements.read_optional(SUBCLASS_ATTRIBUTES_TAG)?;
    let mut type_attributes = elements.enter(TYPE_ATTRIBUTES_TAG)?.enter(SEQUENCE)?;
    let path = decode_path(&mut type_attributes)?;
    let modulus_length = type_attributes
        .read_optional_unsigned(INTEGER)?
        .unwrap_or(0) as usize;

    Ok(Pkcs15Object {
        object_type,
        common,
        data: ObjectData::Key(KeyInfo {
            id,
            usage,
            native,
            access_flags,
            key_reference,
            path,
            modulus_length,
        }),
    })
}

fn decode_pin_object(record: &Tlv) -> Result<Pkcs15Object> {
    let mut elements = Elements::of(record)?;
    let common = decode_common_attributes(&mut elements)?;
    let auth_id = Pkcs15Id::new(elements.enter(SEQUENCE)?.read_primitive(OCTET_STRING)?)?;

    let mut attributes = elements.enter(TYPE_ATTRIBUTES_TAG)?.enter(SEQUENCE)?;
    let flags = PinFlags(attributes.read_bit_string()?);
    let pin_type = PinType::from_u8(attributes.read_unsigned(ENUMERATED)? as u8)?;
    let min_length = attributes.read_unsigned(INTEGER)? as usize;
    let stored_length = attributes.read_unsigned(INTEGER)? as usize;
    let max_length = attributes
        .read_optional_unsigned(INTEGER)?
        .map(|l| l as usize);
    let reference = attributes
        .read_optional_unsigned(PIN_REFERENCE_TAG)?
        .unwrap_or(0) as u32;
    let pad_char = match attributes.read_optional_primitive(OCTET_STRING)? {
        None => None,
        Some(pad) => pad.first().copied(),
    };
    attributes.read_optional(GENERALIZED_TIME)?;
    let path = if attributes.next_has_tag(SEQUENCE)? {
        Some(decode_path(&mut attributes)?)
    } else {
        None
    };

    Ok(Pkcs15Object {
        object_type: ObjectType::AuthPin,
        common,
        data: ObjectData::Pin(PinInfo {
            auth_id,
            flags,
            pin_type,
            min_length,
            stored_length,
            max_length,
            reference,
            pad_char,
            path,
        }),
    })
}

fn record_object_type(kind: DfKind, record: &Tlv) -> Result<Option<ObjectType>> {
    let rsa = has_tag(record, SEQUENCE)?;
    let dsa = has_tag(record, DSA_KEY_TAG)?;
    Ok(match kind {
        DfKind::PrKdf if rsa => Some(ObjectType::PrivateKeyRsa),
        DfKind::PrKdf if dsa => Some(ObjectType::PrivateKeyDsa),
        DfKind::PuKdf if rsa => Some(ObjectType::PublicKeyRsa),
        DfKind::PuKdf if dsa => Some(ObjectType::PublicKeyDsa),
        DfKind::AoDf if rsa => Some(ObjectType::AuthPin),
        _ => None,
    })
}

/// Decode every record stored in one directory file, in order.
pub fn decode_directory_records(kind: DfKind, data: &[u8]) -> Result<Vec<DirectoryRecord>> {
    let mut records = Vec::new();
    for (record, der) in split_records(data)? {
        records.push(match record_object_type(kind, &record)? {
            Some(ObjectType::AuthPin) => DirectoryRecord::Object(decode_pin_object(&record)?),
            Some(object_type) => DirectoryRecord::Object(decode_key_object(object_type, &record)?),
            None => {
                warn!(
                    "Keeping unsupported {} record with tag {:?} as is",
                    kind,
                    record.tag()
                );
                DirectoryRecord::Opaque(der.to_vec())
            }
        });
    }
    Ok(records)
}

/// Decode the objects stored in one directory file, leaving out records of
/// types this crate doesn't model.
pub fn decode_directory(kind: DfKind, data: &[u8]) -> Result<Vec<Pkcs15Object>> {
    Ok(decode_directory_records(kind, data)?
        .into_iter()
        .filter_map(|record| match record {
            DirectoryRecord::Object(object) => Some(object),
            DirectoryRecord::Opaque(_) => None,
        })
        .collect())
}

fn odf_entry_kind(entry: &Tlv) -> Result<Option<DfKind>> {
    for kind in ALL_DF_KINDS.iter() {
        if has_tag(entry, context_constructed(kind.odf_tag_number()))? {
            return Ok(Some(*kind));
        }
    }
    Ok(None)
}

/// Decode the ODF into the (kind, path) pairs it lists, in order.
pub fn decode_odf(data: &[u8]) -> Result<Vec<(DfKind, Path)>> {
    let mut entries = Vec::new();
    for (entry, _) in split_records(data)? {
        match odf_entry_kind(&entry)? {
            Some(kind) => entries.push((kind, decode_path(&mut Elements::of(&entry)?)?)),
            None => warn!("Skipping unsupported ODF entry with tag {:?}", entry.tag()),
        }
    }
    Ok(entries)
}

pub fn decode_token_info(data: &[u8]) -> Result<TokenInfo> {
    let records = split_records(data)?;
    let token_info = match records.first() {
        Some((token_info, _)) => token_info,
        None => return Err(Error::Decode("empty TokenInfo".to_owned())),
    };
    if !has_tag(token_info, SEQUENCE)? {
        return Err(Error::Decode(format!(
            "expected a TokenInfo SEQUENCE, found {:?}",
            token_info.tag()
        )));
    }

    let mut elements = Elements::of(token_info)?;
    let version = elements.read_unsigned(INTEGER)? as u32;
    let serial_number = elements
        .read_optional_primitive(OCTET_STRING)?
        .map(|s| data_encoding::HEXUPPER.encode(s));
    let manufacturer_id = elements.read_optional_utf8(UTF8_STRING)?;
    let label = elements.read_optional_utf8(TOKEN_LABEL_TAG)?;
    let flags = TokenFlags(elements.read_bit_string()?);
    Ok(TokenInfo {
        version,
        serial_number,
        manufacturer_id,
        label,
        flags,
    })
}
