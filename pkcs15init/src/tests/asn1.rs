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

use crate::error::*;
use crate::pkcs15::asn1::*;

fn encoded(tlv: Result<iso7816_tlv::ber::Tlv>) -> Vec<u8> {
    tlv.unwrap().to_vec()
}

#[test]
fn test_encode_lengths() {
    assert_eq!(vec![0x04, 0x02, 0xaa, 0xbb], encoded(octet_string(&[0xaa, 0xbb])));

    let long = encoded(octet_string(&[0; 0x80]));
    assert_eq!(&[0x04, 0x81, 0x80], &long[..3]);
    assert_eq!(0x83, long.len());

    let longer = encoded(octet_string(&[0; 0x1234]));
    assert_eq!(&[0x04, 0x82, 0x12, 0x34], &longer[..4]);
}

#[test]
fn test_encode_integer() {
    assert_eq!(vec![0x02, 0x01, 0x00], encoded(integer(0)));
    assert_eq!(vec![0x02, 0x01, 0x7f], encoded(integer(0x7f)));
    assert_eq!(vec![0x02, 0x02, 0x00, 0x80], encoded(integer(0x80)));
    assert_eq!(vec![0x02, 0x02, 0x04, 0x00], encoded(integer(1024)));
    assert_eq!(
        vec![0x02, 0x03, 0x00, 0xff, 0x01],
        encoded(big_integer(&[0x00, 0x00, 0xff, 0x01]))
    );
}

#[test]
fn test_decode_unsigned() {
    assert_eq!(0, decode_unsigned(&[0x00]).unwrap());
    assert_eq!(0x80, decode_unsigned(&[0x00, 0x80]).unwrap());
    assert_eq!(2048, decode_unsigned(&[0x08, 0x00]).unwrap());
    assert!(decode_unsigned(&[]).is_err());
    assert!(decode_unsigned(&[0xff]).is_err());
}

#[test]
fn test_encode_bit_string() {
    assert_eq!(vec![0x03, 0x01, 0x00], encoded(bit_string(0)));
    // Bit 0 only: one byte, seven unused bits.
    assert_eq!(vec![0x03, 0x02, 0x07, 0x80], encoded(bit_string(0b1)));
    // sign | decrypt | nonRepudiation, i.e. bits 1, 2 and 9.
    assert_eq!(
        vec![0x03, 0x03, 0x06, 0x60, 0x40],
        encoded(bit_string((1 << 1) | (1 << 2) | (1 << 9)))
    );
}

#[test]
fn test_decode_bit_string() {
    assert_eq!(0, decode_bit_string(&[0x00]).unwrap());
    assert_eq!(0b1, decode_bit_string(&[0x07, 0x80]).unwrap());
    assert_eq!(
        (1 << 1) | (1 << 2) | (1 << 9),
        decode_bit_string(&[0x06, 0x60, 0x40]).unwrap()
    );
    assert!(decode_bit_string(&[]).is_err());
    assert!(decode_bit_string(&[0x08, 0x00]).is_err());
    assert!(decode_bit_string(&[0x01]).is_err());
}

#[test]
fn test_constructed_tag_must_match_value() {
    assert!(primitive(SEQUENCE, vec![]).is_err());
    assert!(constructed(INTEGER, vec![]).is_err());
    assert!(constructed(context_constructed(1), vec![]).is_ok());
}

#[test]
fn test_split_records_stops_at_padding() {
    let data = [
        encoded(integer(5)),
        encoded(constructed(SEQUENCE, vec![octet_string(&[0x3f, 0x00]).unwrap()])),
        vec![0x00, 0x00, 0x02, 0x01, 0x01],
    ]
    .concat();
    let records = split_records(data.as_slice()).unwrap();
    assert_eq!(2, records.len());
    assert_eq!(&[0x02, 0x01, 0x05], records[0].1);
    assert_eq!(&[0x30, 0x04, 0x04, 0x02, 0x3f, 0x00], records[1].1);

    assert!(split_records(&[0xff; 16]).unwrap().is_empty());
    assert!(split_records(&[0x30, 0x05, 0x02]).is_err());
}

#[test]
fn test_elements() {
    let sequence = constructed(
        SEQUENCE,
        vec![
            integer(5).unwrap(),
            constructed(SEQUENCE, vec![octet_string(&[0x3f, 0x00]).unwrap()]).unwrap(),
        ],
    )
    .unwrap();
    let mut elements = Elements::of(&sequence).unwrap();
    assert!(elements.read_optional(BOOLEAN).unwrap().is_none());
    assert_eq!(5, elements.read_unsigned(INTEGER).unwrap());
    match elements.read(INTEGER) {
        Err(Error::Decode(_)) => {}
        r => panic!("Unexpected result: {:?}", r.map(|t| t.to_vec())),
    }
    let mut inner = elements.enter(SEQUENCE).unwrap();
    assert_eq!(&[0x3f, 0x00], inner.read_primitive(OCTET_STRING).unwrap());
    assert!(inner.is_empty());
    assert!(elements.is_empty());

    assert!(Elements::of(&integer(1).unwrap()).is_err());
}
