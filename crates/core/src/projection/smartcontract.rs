//! Auxiliary projection, enabled only by `index_smart_contracts`. A
//! transaction is treated as a contract deployment when its first output is
//! an `OP_RETURN` script carrying a recognizable marker prefix followed by
//! the contract bytecode; this mirrors the simple embed-in-OP_RETURN
//! convention used by the smart-contract explorers this crate's balance and
//! transaction tables are otherwise modeled on.

use bitcoin::blockdata::opcodes::all::OP_RETURN;
use bitcoin::blockdata::script::Instruction;
use bitcoin::Transaction;

use crate::rows::SmartContractDetail;

/// Marker bytes identifying a contract-deployment `OP_RETURN` payload.
const CONTRACT_MARKER: &[u8] = b"SC1";

/// Looks for a contract-deployment marker in `tx`'s outputs and, if found,
/// returns the detail row to write.
pub fn detect(tx: &Transaction) -> Option<SmartContractDetail> {
    for output in &tx.output {
        let script = &output.script_pubkey;
        let mut instructions = script.instructions();
        if !matches!(instructions.next(), Some(Ok(Instruction::Op(op))) if op == OP_RETURN) {
            continue;
        }
        let Some(Ok(Instruction::PushBytes(payload))) = instructions.next() else {
            continue;
        };
        let bytes = payload.as_bytes();
        if let Some(bytecode) = bytes.strip_prefix(CONTRACT_MARKER) {
            return Some(SmartContractDetail {
                contract_entry_id: tx.compute_txid().to_string(),
                bytecode_hex: hex::encode(bytecode),
            });
        }
    }
    None
}
