//! Standard script templates and a small interpreter for verifying signed
//! inputs locally.
//!
//! The interpreter covers the opcodes used by pay-to-public-key and
//! pay-to-public-key-hash spends. Anything else is reported as unsupported
//! rather than guessed at.

use bitcoin::blockdata::opcodes::all::*;
use bitcoin::blockdata::opcodes::Opcode;
use bitcoin::blockdata::script::{Builder, Instruction, PushBytesBuf};
use bitcoin::hashes::{hash160, sha256, sha256d, Hash};
use bitcoin::secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1};
use bitcoin::sighash::SighashCache;
use bitcoin::{ecdsa, PubkeyHash, Script, ScriptBuf, ScriptHash, Transaction};

use crate::error::BtcError;

const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;
const MAX_STACK_SIZE: usize = 1000;

/// OP_DUP OP_HASH160 <20-byte hash> OP_EQUALVERIFY OP_CHECKSIG
pub fn p2pkh_script(pubkey_hash: &[u8; 20]) -> ScriptBuf {
    ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(*pubkey_hash))
}

/// OP_HASH160 <20-byte hash> OP_EQUAL
pub fn p2sh_script(script_hash: &[u8; 20]) -> ScriptBuf {
    ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(*script_hash))
}

/// <version> <program>
pub fn witness_script(version: u8, program: &[u8]) -> Result<ScriptBuf, BtcError> {
    if version > 16 {
        return Err(BtcError::InvalidAddress(format!(
            "invalid witness version {version}"
        )));
    }
    Ok(Builder::new()
        .push_int(i64::from(version))
        .push_slice(push_bytes(program.to_vec())?)
        .into_script())
}

/// Unlocking script for a P2PKH output: <DER sig + hashtype> <pubkey>.
pub fn p2pkh_script_sig(
    signature: &ecdsa::Signature,
    pubkey: &[u8; 33],
) -> Result<ScriptBuf, BtcError> {
    Ok(Builder::new()
        .push_slice(push_bytes(signature.to_vec())?)
        .push_slice(push_bytes(pubkey.to_vec())?)
        .into_script())
}

/// The pubkey hash locked by a P2PKH script, if the script is one.
pub fn p2pkh_hash(script: &Script) -> Option<[u8; 20]> {
    if !script.is_p2pkh() {
        return None;
    }
    script.as_bytes()[3..23].try_into().ok()
}

fn push_bytes(data: Vec<u8>) -> Result<PushBytesBuf, BtcError> {
    PushBytesBuf::try_from(data).map_err(|e| script_error(format!("push too large: {e}")))
}

/// Verify input `input_index` of `tx` against the output script it spends.
///
/// Runs the scriptSig (which must be push-only), then the scriptPubKey on the
/// resulting stack. Succeeds when the final stack top is true.
pub fn verify_input(
    tx: &Transaction,
    input_index: usize,
    prev_script_pubkey: &Script,
) -> Result<(), BtcError> {
    let input = tx.input.get(input_index).ok_or_else(|| {
        BtcError::SigningError(format!("input index {input_index} out of range"))
    })?;

    if prev_script_pubkey.is_p2sh() {
        return Err(BtcError::SigningError(
            "pay-to-script-hash evaluation is not supported".into(),
        ));
    }
    if !input.script_sig.is_push_only() {
        return Err(script_error("scriptSig is not push-only".into()));
    }

    let mut interpreter = Interpreter {
        tx,
        input_index,
        stack: Vec::new(),
    };

    interpreter.run(&input.script_sig)?;
    interpreter.run(prev_script_pubkey)?;

    match interpreter.stack.last() {
        Some(top) if cast_to_bool(top) => Ok(()),
        _ => Err(BtcError::SigningError(format!(
            "script verification failed for input {input_index}"
        ))),
    }
}

struct Interpreter<'a> {
    tx: &'a Transaction,
    input_index: usize,
    stack: Vec<Vec<u8>>,
}

impl Interpreter<'_> {
    fn run(&mut self, script: &Script) -> Result<(), BtcError> {
        for instruction in script.instructions() {
            let instruction =
                instruction.map_err(|e| script_error(format!("malformed script: {e}")))?;
            match instruction {
                Instruction::PushBytes(data) => self.push(data.as_bytes().to_vec())?,
                Instruction::Op(op) => self.execute(op, script)?,
            }
        }
        Ok(())
    }

    fn execute(&mut self, op: Opcode, script: &Script) -> Result<(), BtcError> {
        match op.to_u8() {
            x if x == OP_PUSHNUM_NEG1.to_u8() => self.push(vec![0x81])?,
            x if (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8()).contains(&x) => {
                self.push(vec![x - OP_PUSHNUM_1.to_u8() + 1])?
            }
            x if x == OP_NOP.to_u8() => {}
            x if x == OP_VERIFY.to_u8() => {
                let top = self.pop()?;
                if !cast_to_bool(&top) {
                    return Err(script_error("OP_VERIFY failed".into()));
                }
            }
            x if x == OP_RETURN.to_u8() => {
                return Err(script_error("OP_RETURN encountered".into()))
            }
            x if x == OP_DROP.to_u8() => {
                self.pop()?;
            }
            x if x == OP_DUP.to_u8() => {
                let top = self.stack.last().cloned().ok_or_else(stack_underflow)?;
                self.push(top)?;
            }
            x if x == OP_EQUAL.to_u8() || x == OP_EQUALVERIFY.to_u8() => {
                let a = self.pop()?;
                let b = self.pop()?;
                let equal = a == b;
                if x == OP_EQUALVERIFY.to_u8() {
                    if !equal {
                        return Err(script_error("OP_EQUALVERIFY failed".into()));
                    }
                } else {
                    self.push_bool(equal)?;
                }
            }
            x if x == OP_SHA256.to_u8() => {
                let top = self.pop()?;
                self.push(sha256::Hash::hash(&top).to_byte_array().to_vec())?;
            }
            x if x == OP_HASH160.to_u8() => {
                let top = self.pop()?;
                self.push(hash160::Hash::hash(&top).to_byte_array().to_vec())?;
            }
            x if x == OP_HASH256.to_u8() => {
                let top = self.pop()?;
                self.push(sha256d::Hash::hash(&top).to_byte_array().to_vec())?;
            }
            x if x == OP_CHECKSIG.to_u8() || x == OP_CHECKSIGVERIFY.to_u8() => {
                let pubkey = self.pop()?;
                let signature = self.pop()?;
                let valid = self.check_sig(&signature, &pubkey, script)?;
                if x == OP_CHECKSIGVERIFY.to_u8() {
                    if !valid {
                        return Err(script_error("OP_CHECKSIGVERIFY failed".into()));
                    }
                } else {
                    self.push_bool(valid)?;
                }
            }
            _ => return Err(script_error(format!("unsupported opcode {op}"))),
        }
        Ok(())
    }

    fn check_sig(
        &self,
        signature: &[u8],
        pubkey: &[u8],
        script_code: &Script,
    ) -> Result<bool, BtcError> {
        let Some((&hash_type, der)) = signature.split_last() else {
            return Ok(false);
        };

        let Ok(public_key) = PublicKey::from_slice(pubkey) else {
            return Ok(false);
        };
        let Ok(mut sig) = Signature::from_der_lax(der) else {
            return Ok(false);
        };
        // Consensus accepts high-S signatures; libsecp256k1 only verifies low-S.
        sig.normalize_s();

        let sighash = SighashCache::new(self.tx)
            .legacy_signature_hash(self.input_index, script_code, u32::from(hash_type))
            .map_err(|e| script_error(format!("sighash: {e}")))?;
        let msg = Message::from_digest(sighash.to_byte_array());
        let secp = Secp256k1::verification_only();
        Ok(secp.verify_ecdsa(&msg, &sig, &public_key).is_ok())
    }

    fn push(&mut self, item: Vec<u8>) -> Result<(), BtcError> {
        if item.len() > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(script_error(format!("push of {} bytes exceeds limit", item.len())));
        }
        if self.stack.len() >= MAX_STACK_SIZE {
            return Err(script_error("stack size limit exceeded".into()));
        }
        self.stack.push(item);
        Ok(())
    }

    fn push_bool(&mut self, value: bool) -> Result<(), BtcError> {
        self.push(if value { vec![1] } else { Vec::new() })
    }

    fn pop(&mut self) -> Result<Vec<u8>, BtcError> {
        self.stack.pop().ok_or_else(stack_underflow)
    }
}

/// Script truthiness: any non-zero byte, except a lone sign bit in the last byte.
fn cast_to_bool(item: &[u8]) -> bool {
    for (i, byte) in item.iter().enumerate() {
        if *byte != 0 {
            return !(i == item.len() - 1 && *byte == 0x80);
        }
    }
    false
}

fn stack_underflow() -> BtcError {
    script_error("stack underflow".into())
}

fn script_error(msg: String) -> BtcError {
    BtcError::SigningError(format!("script: {msg}"))
}
