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
use crate::pkcs15::*;
use data_encoding::HEXUPPER_PERMISSIVE;
use iso7816_tlv::ber::Tlv;

/// The tag of the CHOICE alternative DSA keys are encoded in, in both the
/// PrivateKeyType and PublicKeyType CHOICEs.
pub const DSA_KEY_TAG: u8 = context_constructed(2);

pub(crate) const SUBCLASS_ATTRIBUTES_TAG: u8 = context_constructed(0);
pub(crate) const TYPE_ATTRIBUTES_TAG: u8 = context_constructed(1);
pub(crate) const PIN_REFERENCE_TAG: u8 = context(0);
pub(crate) const TOKEN_LABEL_TAG: u8 = context(0);

fn path_tlv(path: &Path) -> Result<Tlv> {
    constructed(SEQUENCE, vec![octet_string(path.as_bytes())?])
}

fn common_attributes(common: &CommonAttributes) -> Result<Tlv> {
    let mut elements = Vec::new();
    if !common.label.is_empty() {
        elements.push(utf8_string(UTF8_STRING, common.label.as_str())?);
    }
    if !common.flags.is_empty() {
        elements.push(bit_string(common.flags.bits())?);
    }
    if let Some(auth_id) = common.auth_id.as_ref() {
        elements.push(octet_string(auth_id.as_bytes())?);
    }
    constructed(SEQUENCE, elements)
}

fn common_key_attributes(info: &KeyInfo) -> Result<Tlv> {
    let mut elements = vec![octet_string(info.id.as_bytes())?, bit_string(info.usage.bits())?];
    // native is DEFAULT TRUE, so DER omits it unless it's false.
    if !info.native {
        elements.push(boolean(false)?);
    }
    if !info.access_flags.is_empty() {
        elements.push(bit_string(info.access_flags.bits())?);
    }
    if let Some(reference) = info.key_reference {
        elements.push(integer(reference as u64)?);
    }
    constructed(SEQUENCE, elements)
}

fn key_object(object: &Pkcs15Object, info: &KeyInfo) -> Result<Tlv> {
    let type_attributes = match object.object_type {
        ObjectType::PrivateKeyRsa | ObjectType::PublicKeyRsa => constructed(
            SEQUENCE,
            vec![path_tlv(&info.path)?, integer(info.modulus_length as u64)?],
        )?,
        _ => constructed(SEQUENCE, vec![path_tlv(&info.path)?])?,
    };

    let tag = match object.object_type {
        ObjectType::PrivateKeyDsa | ObjectType::PublicKeyDsa => DSA_KEY_TAG,
        _ => SEQUENCE,
    };
    constructed(
        tag,
        vec![
            common_attributes(&object.common)?,
            common_key_attributes(info)?,
            constructed(TYPE_ATTRIBUTES_TAG, vec![type_attributes])?,
        ],
    )
}

fn pin_object(object: &Pkcs15Object, info: &PinInfo) -> Result<Tlv> {
    let mut attributes = vec![
        bit_string(info.flags.bits())?,
        unsigned(ENUMERATED, info.pin_type.to_u8() as u64)?,
        integer(info.min_length as u64)?,
        integer(info.stored_length as u64)?,
    ];
    if let Some(max_length) = info.max_length {
        attributes.push(integer(max_length as u64)?);
    }
    // pinReference is DEFAULT 0.
    if info.reference != 0 {
        attributes.push(unsigned(PIN_REFERENCE_TAG, info.reference as u64)?);
    }
    if let Some(pad_char) = info.pad_char {
        attributes.push(octet_string(&[pad_char])?);
    }
    if let Some(path) = info.path.as_ref() {
        attributes.push(path_tlv(path)?);
    }

    constructed(
        SEQUENCE,
        vec![
            common_attributes(&object.common)?,
            constructed(SEQUENCE, vec![octet_string(info.auth_id.as_bytes())?])?,
            constructed(
                TYPE_ATTRIBUTES_TAG,
                vec![constructed(SEQUENCE, attributes)?],
            )?,
        ],
    )
}

/// Encode a single directory file record.
pub fn encode_object(object: &Pkcs15Object) -> Result<Vec<u8>> {
    let tlv = match (object.object_type, &object.data) {
        (ObjectType::AuthPin, ObjectData::Pin(info)) => pin_object(object, info)?,
        (ObjectType::AuthPin, _) => {
            return Err(Error::Internal(format!(
                "PIN object '{}' carries key attributes",
                object.common.label
            )));
        }
        (_, ObjectData::Key(info)) => key_object(object, info)?,
        (object_type, _) => {
            return Err(Error::Internal(format!(
                "{} object '{}' carries PIN attributes",
                object_type, object.common.label
            )));
        }
    };
    Ok(tlv.to_vec())
}

/// Encode the records of one segment of the given directory. Records read
/// from the card which this crate doesn't model are written back verbatim,
/// ahead of the modeled ones.
pub fn encode_directory(directory: &Directory, segment: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for der in directory.segment_opaque_records(segment) {
        out.extend_from_slice(der);
    }
    for object in directory.segment_objects(segment) {
        if object.object_type.directory() != directory.kind() {
            return Err(Error::Internal(format!(
                "{} object '{}' doesn't belong in a {}",
                object.object_type,
                object.common.label,
                directory.kind()
            )));
        }
        out.extend(encode_object(object)?);
    }
    Ok(out)
}

/// Encode the ODF, which points at every card file backing a directory.
pub fn encode_odf(card: &Pkcs15Card) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for directory in card.directories() {
        let tag = context_constructed(directory.kind().odf_tag_number());
        for file in directory.files() {
            out.extend(constructed(tag, vec![path_tlv(&file.path)?])?.to_vec());
        }
    }
    Ok(out)
}

pub fn encode_token_info(info: &TokenInfo) -> Result<Vec<u8>> {
    let mut elements = vec![integer(info.version as u64)?];
    if let Some(serial_number) = info.serial_number.as_ref() {
        let serial_number = HEXUPPER_PERMISSIVE.decode(serial_number.as_bytes())?;
        elements.push(octet_string(serial_number.as_slice())?);
    }
    if let Some(manufacturer_id) = info.manufacturer_id.as_ref() {
        elements.push(utf8_string(UTF8_STRING, manufacturer_id.as_str())?);
    }
    if let Some(label) = info.label.as_ref() {
        elements.push(utf8_string(TOKEN_LABEL_TAG, label.as_str())?);
    }
    elements.push(bit_string(info.flags.bits())?);
    Ok(constructed(SEQUENCE, elements)?.to_vec())
}
