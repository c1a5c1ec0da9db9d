//! Transparent address classification and Base58Check display.

use std::{fmt, io};

#[cfg(test)]
use proptest::{arbitrary::Arbitrary, prelude::*};

use crate::{
    hash::Hash160,
    network::Network,
    serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError},
};

use super::Script;

/// Magic numbers used to identify what networks an `Address` belongs to.
mod magics {
    pub mod p2sh {
        pub const MAINNET: [u8; 1] = [0x05];
        pub const TESTNET: [u8; 1] = [0xc4];
    }

    pub mod p2pkh {
        pub const MAINNET: [u8; 1] = [0x00];
        pub const TESTNET: [u8; 1] = [0x6f];
    }
}

/// A transparent (Bitcoin-inherited) address.
///
/// A single byte is prepended to a 20-byte hash to specify the address type,
/// the result is hashed with sha256d, the first four bytes of that hash are
/// appended as a checksum, and the whole thing is Base58 encoded.
///
/// <https://en.bitcoin.it/wiki/Base58Check_encoding>
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Address {
    /// P2SH (Pay to Script Hash) addresses.
    PayToScriptHash { network: Network, script_hash: Hash160 },
    /// P2PKH (Pay to Public Key Hash) addresses.
    PayToPublicKeyHash { network: Network, pub_key_hash: Hash160 },
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut debug_struct = f.debug_struct("Address");
        match self {
            Address::PayToScriptHash { network, script_hash } => debug_struct
                .field("network", network)
                .field("script_hash", script_hash)
                .finish(),
            Address::PayToPublicKeyHash { network, pub_key_hash } => debug_struct
                .field("network", network)
                .field("pub_key_hash", pub_key_hash)
                .finish(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut bytes = io::Cursor::new(Vec::new());
        let _ = self.bitcoin_serialize(&mut bytes);
        f.write_str(&bs58::encode(bytes.get_ref()).with_check().into_string())
    }
}

impl std::str::FromStr for Address {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match bs58::decode(s).with_check(None).into_vec() {
            Ok(bytes) => Self::bitcoin_deserialize(&bytes[..]),
            Err(_) => Err(SerializationError::Parse("address decoding error")),
        }
    }
}

impl BitcoinSerialize for Address {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        match self {
            Address::PayToScriptHash { network, script_hash } => {
                match *network {
                    Network::Mainnet => writer.write_all(&magics::p2sh::MAINNET[..])?,
                    Network::Testnet => writer.write_all(&magics::p2sh::TESTNET[..])?,
                }
                writer.write_all(&script_hash.0)?
            }
            Address::PayToPublicKeyHash { network, pub_key_hash } => {
                match *network {
                    Network::Mainnet => writer.write_all(&magics::p2pkh::MAINNET[..])?,
                    Network::Testnet => writer.write_all(&magics::p2pkh::TESTNET[..])?,
                }
                writer.write_all(&pub_key_hash.0)?
            }
        }
        Ok(())
    }
}

impl BitcoinDeserialize for Address {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let mut version_bytes = [0; 1];
        reader.read_exact(&mut version_bytes)?;

        let mut hash_bytes = [0; 20];
        reader.read_exact(&mut hash_bytes)?;
        let hash = Hash160(hash_bytes);

        match version_bytes {
            magics::p2sh::MAINNET => Ok(Address::PayToScriptHash { network: Network::Mainnet, script_hash: hash }),
            magics::p2sh::TESTNET => Ok(Address::PayToScriptHash { network: Network::Testnet, script_hash: hash }),
            magics::p2pkh::MAINNET => Ok(Address::PayToPublicKeyHash { network: Network::Mainnet, pub_key_hash: hash }),
            magics::p2pkh::TESTNET => Ok(Address::PayToPublicKeyHash { network: Network::Testnet, pub_key_hash: hash }),
            _ => Err(SerializationError::Parse("bad addr version/type")),
        }
    }
}

/// Classifies a `script_pubkey` by byte pattern and extracts the hash that
/// would index it in the address→outpoints index, if any.
///
/// Recognizes P2PKH, P2SH, P2WPKH, and P2WSH. P2WSH's 32-byte witness script
/// hash is truncated to 20 bytes, matching the address index's fixed-width
/// key; this loses information (see module docs on collisions) but preserves
/// compatibility with the source this behavior is inherited from. Any other
/// script shape is not addressable and returns `None`; the output remains
/// fully present in the UTXO set, just not reachable via the address index.
pub fn classify_address(script: &Script) -> Option<Hash160> {
    let bytes = &script.0;
    match bytes.len() {
        25 if bytes[0] == 0x76 && bytes[1] == 0xa9 && bytes[2] == 0x14 && bytes[23] == 0x88 && bytes[24] == 0xac => {
            Some(hash160_from_slice(&bytes[3..23]))
        }
        23 if bytes[0] == 0xa9 && bytes[1] == 0x14 && bytes[22] == 0x87 => Some(hash160_from_slice(&bytes[2..22])),
        22 if bytes[0] == 0x00 && bytes[1] == 0x14 => Some(hash160_from_slice(&bytes[2..22])),
        34 if bytes[0] == 0x00 && bytes[1] == 0x20 => Some(hash160_from_slice(&bytes[2..22])),
        _ => None,
    }
}

fn hash160_from_slice(slice: &[u8]) -> Hash160 {
    let mut out = [0u8; 20];
    out.copy_from_slice(slice);
    Hash160(out)
}

#[cfg(test)]
impl Address {
    fn p2pkh_strategy() -> impl Strategy<Value = Self> {
        (any::<Network>(), any::<[u8; 20]>())
            .prop_map(|(network, pub_key_hash)| Self::PayToPublicKeyHash { network, pub_key_hash: Hash160(pub_key_hash) })
            .boxed()
    }

    fn p2sh_strategy() -> impl Strategy<Value = Self> {
        (any::<Network>(), any::<[u8; 20]>())
            .prop_map(|(network, script_hash)| Self::PayToScriptHash { network, script_hash: Hash160(script_hash) })
            .boxed()
    }
}

#[cfg(test)]
impl Arbitrary for Address {
    type Parameters = ();

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        prop_oneof![Self::p2pkh_strategy(), Self::p2sh_strategy()].boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p2pkh_classifies() {
        let mut script = vec![0x76, 0xa9, 0x14];
        script.extend_from_slice(&[0xAB; 20]);
        script.extend_from_slice(&[0x88, 0xac]);
        let hash = classify_address(&Script(script)).expect("p2pkh should classify");
        assert_eq!(hash.0, [0xAB; 20]);
    }

    #[test]
    fn p2sh_classifies() {
        let mut script = vec![0xa9, 0x14];
        script.extend_from_slice(&[0xCD; 20]);
        script.push(0x87);
        let hash = classify_address(&Script(script)).expect("p2sh should classify");
        assert_eq!(hash.0, [0xCD; 20]);
    }

    #[test]
    fn p2wpkh_classifies() {
        let mut script = vec![0x00, 0x14];
        script.extend_from_slice(&[0xEF; 20]);
        let hash = classify_address(&Script(script)).expect("p2wpkh should classify");
        assert_eq!(hash.0, [0xEF; 20]);
    }

    #[test]
    fn p2wsh_truncates_to_20_bytes() {
        let mut script = vec![0x00, 0x20];
        script.extend_from_slice(&[0x11; 32]);
        let hash = classify_address(&Script(script)).expect("p2wsh should classify");
        assert_eq!(hash.0, [0x11; 20]);
    }

    #[test]
    fn one_byte_alteration_rejects_p2pkh() {
        let mut script = vec![0x76, 0xa9, 0x14];
        script.extend_from_slice(&[0xAB; 20]);
        script.extend_from_slice(&[0x88, 0xad]); // wrong final opcode
        assert_eq!(classify_address(&Script(script)), None);
    }

    #[test]
    fn wrong_length_rejects() {
        let script = Script(vec![0; 24]);
        assert_eq!(classify_address(&script), None);
    }

    #[test]
    fn address_roundtrip() {
        let addr = Address::PayToPublicKeyHash { network: Network::Mainnet, pub_key_hash: Hash160([7; 20]) };
        let text = format!("{}", addr);
        let parsed: Address = text.parse().unwrap();
        assert!(addr == parsed);
    }
}

#[cfg(test)]
proptest! {
    #[test]
    fn transparent_address_roundtrip(taddr in any::<Address>()) {
        let mut data = Vec::new();
        taddr.bitcoin_serialize(&mut data).expect("t-addr should serialize");
        let taddr2 = Address::bitcoin_deserialize(&data[..]).expect("randomized t-addr should deserialize");
        prop_assert_eq![taddr, taddr2];
    }
}
