//! Hand-written (de)serialization for transparent types the derive macro
//! can't handle: `OutPoint::bitcoin_deserialize` (the struct derives only
//! `BtcSerialize`) and all of `Input`, an enum the derive macro does not
//! support yet (see `bitcoin_serde_derive::deserialize`'s struct-only
//! codegen). `Address` in this module is given the same manual treatment.

use std::io;

use crate::{
    block::Height,
    cached::Cached,
    compactint::CompactInt,
    serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError},
};

use super::{CoinbaseData, Input, OutPoint, Script};

impl BitcoinDeserialize for OutPoint {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(OutPoint {
            hash: crate::hash::Hash256::bitcoin_deserialize(&mut reader)?,
            index: u32::bitcoin_deserialize(&mut reader)?,
        })
    }
}

impl BitcoinSerialize for Input {
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        match self {
            Input::PrevOut { outpoint, unlock_script, sequence } => {
                outpoint.bitcoin_serialize(&mut target)?;
                unlock_script.bitcoin_serialize(&mut target)?;
                sequence.bitcoin_serialize(&mut target)
            }
            Input::Coinbase { data, sequence, .. } => {
                // The null outpoint (all-zero hash, index u32::MAX) marks a coinbase input.
                OutPoint {
                    hash: crate::hash::Hash256([0; 32]),
                    index: u32::MAX,
                }
                .bitcoin_serialize(&mut target)?;
                CompactInt::from(data.serialized_size() - CompactInt::size(data.0.len()))
                    .bitcoin_serialize(&mut target)?;
                target.write_all(&data.0)?;
                sequence.bitcoin_serialize(&mut target)
            }
        }
    }
}

impl BitcoinDeserialize for Input {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let outpoint = OutPoint::bitcoin_deserialize(&mut reader)?;
        if outpoint.index == u32::MAX && outpoint.hash == crate::hash::Hash256([0; 32]) {
            let len = CompactInt::bitcoin_deserialize(&mut reader)?.value() as usize;
            let mut data = vec![0u8; len];
            io::Read::read_exact(&mut reader, &mut data)?;
            let sequence = u32::bitcoin_deserialize(&mut reader)?;
            Ok(Input::Coinbase {
                height: Some(Cached::<Height>::new()),
                data: CoinbaseData(data),
                sequence,
            })
        } else {
            let unlock_script = Script::bitcoin_deserialize(&mut reader)?;
            let sequence = u32::bitcoin_deserialize(&mut reader)?;
            Ok(Input::PrevOut { outpoint, unlock_script, sequence })
        }
    }
}
