/// Event log and call-trace decoding
///
/// Layouts (indexed params live in topics, the rest in 32-byte data words):
///
/// | event | topics | data words |
/// |---|---|---|
/// | `Transfer` | from, to | amount |
/// | `Swap` (V2) | sender, to | amount0In, amount1In, amount0Out, amount1Out |
/// | `Swap` (V3) | sender, recipient | amount0, amount1, sqrtPriceX96, liquidity, tick |
/// | `OFTSent` | guid, fromAddress | dstEid, amountSentLD, amountReceivedLD |
/// | `OFTReceived` | guid, toAddress | srcEid, amountReceivedLD |
/// | `ETHBridgeInitiated/Finalized` | from, to | amount, extraData |
/// | `ERC20BridgeInitiated/Finalized` | localToken, remoteToken, from | to, amount, extraData |
/// | `Supply` | reserve, onBehalfOf, referralCode | user, amount |
/// | `Withdraw` | reserve, user, to | amount |
/// | `Borrow` | reserve, onBehalfOf, referralCode | user, amount, mode, rate |
/// | `Repay` | reserve, user, repayer | amount, useATokens |

use std::sync::LazyLock;

use alloy_primitives::{keccak256, B256, U256};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{address_at, as_entries, decode_hex, word, word_address, ParseError};
use crate::core::units::parse_amount;

fn topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

fn topic_hex(topic: &B256) -> String {
    format!("0x{}", hex::encode(topic.as_slice()))
}

static TRANSFER: LazyLock<B256> = LazyLock::new(|| topic("Transfer(address,address,uint256)"));
static SWAP_V2: LazyLock<B256> =
    LazyLock::new(|| topic("Swap(address,uint256,uint256,uint256,uint256,address)"));
static SWAP_V3: LazyLock<B256> =
    LazyLock::new(|| topic("Swap(address,address,int256,int256,uint160,uint128,int24)"));
static OFT_SENT: LazyLock<B256> =
    LazyLock::new(|| topic("OFTSent(bytes32,uint32,address,uint256,uint256)"));
static OFT_RECEIVED: LazyLock<B256> =
    LazyLock::new(|| topic("OFTReceived(bytes32,uint32,address,uint256)"));
static ETH_BRIDGE_INITIATED: LazyLock<B256> =
    LazyLock::new(|| topic("ETHBridgeInitiated(address,address,uint256,bytes)"));
static ETH_BRIDGE_FINALIZED: LazyLock<B256> =
    LazyLock::new(|| topic("ETHBridgeFinalized(address,address,uint256,bytes)"));
static ERC20_BRIDGE_INITIATED: LazyLock<B256> =
    LazyLock::new(|| topic("ERC20BridgeInitiated(address,address,address,address,uint256,bytes)"));
static ERC20_BRIDGE_FINALIZED: LazyLock<B256> =
    LazyLock::new(|| topic("ERC20BridgeFinalized(address,address,address,address,uint256,bytes)"));
static LENDING_SUPPLY: LazyLock<B256> =
    LazyLock::new(|| topic("Supply(address,address,address,uint256,uint16)"));
static LENDING_WITHDRAW: LazyLock<B256> =
    LazyLock::new(|| topic("Withdraw(address,address,address,uint256)"));
static LENDING_BORROW: LazyLock<B256> =
    LazyLock::new(|| topic("Borrow(address,address,address,uint256,uint8,uint256,uint16)"));
static LENDING_REPAY: LazyLock<B256> =
    LazyLock::new(|| topic("Repay(address,address,address,uint256,bool)"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeDirection {
    Initiated,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapLayout {
    V2,
    V3,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEvent {
    Transfer {
        token: String,
        from: String,
        to: String,
        amount: U256,
    },
    Swap {
        pool: String,
        layout: SwapLayout,
        sender: String,
        recipient: String,
    },
    OftSent {
        token: String,
        from: String,
        amount: U256,
    },
    OftReceived {
        token: String,
        to: String,
        amount: U256,
    },
    EthBridge {
        direction: BridgeDirection,
        from: String,
        to: String,
        amount: U256,
    },
    Erc20Bridge {
        direction: BridgeDirection,
        local_token: String,
        from: String,
        to: String,
        amount: U256,
    },
    Supply {
        reserve: String,
        user: String,
        on_behalf_of: String,
        amount: U256,
    },
    Withdraw {
        reserve: String,
        user: String,
        amount: U256,
    },
    Borrow {
        reserve: String,
        user: String,
        on_behalf_of: String,
        amount: U256,
    },
    Repay {
        reserve: String,
        user: String,
        amount: U256,
    },
}

/// Wire shape of one enrichment log entry
#[derive(Debug, Clone, Deserialize)]
pub struct RawLog {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

/// Native value moved by an internal call
#[derive(Debug, Clone, PartialEq)]
pub struct InternalTransfer {
    pub from: String,
    pub to: String,
    pub value: U256,
}

fn topic_bytes(log: &RawLog, index: usize) -> Result<Vec<u8>, ParseError> {
    let raw = log.topics.get(index).ok_or(ParseError::TopicCount {
        expected: index + 1,
        found: log.topics.len(),
    })?;
    let bytes = decode_hex("topics", raw)?;
    if bytes.len() != 32 {
        return Err(ParseError::InvalidHex {
            field: "topics",
            value: raw.clone(),
        });
    }
    Ok(bytes)
}

fn topic_address(log: &RawLog, index: usize) -> Result<String, ParseError> {
    Ok(word_address(&topic_bytes(log, index)?))
}

pub fn parse_log(log: &RawLog) -> Result<ParsedEvent, ParseError> {
    let topic0 = B256::from_slice(&topic_bytes(log, 0)?);
    let emitter = log.address.to_ascii_lowercase();
    let data = decode_hex("data", &log.data)?;

    let event = if topic0 == *TRANSFER {
        // ERC-721 Transfer indexes the token id; only the ERC-20 layout carries an amount word
        ParsedEvent::Transfer {
            token: emitter,
            from: topic_address(log, 1)?,
            to: topic_address(log, 2)?,
            amount: word(&data, 0)?,
        }
    } else if topic0 == *SWAP_V2 || topic0 == *SWAP_V3 {
        ParsedEvent::Swap {
            pool: emitter,
            layout: if topic0 == *SWAP_V2 { SwapLayout::V2 } else { SwapLayout::V3 },
            sender: topic_address(log, 1)?,
            recipient: topic_address(log, 2)?,
        }
    } else if topic0 == *OFT_SENT {
        ParsedEvent::OftSent {
            token: emitter,
            from: topic_address(log, 2)?,
            amount: word(&data, 1)?,
        }
    } else if topic0 == *OFT_RECEIVED {
        ParsedEvent::OftReceived {
            token: emitter,
            to: topic_address(log, 2)?,
            amount: word(&data, 1)?,
        }
    } else if topic0 == *ETH_BRIDGE_INITIATED || topic0 == *ETH_BRIDGE_FINALIZED {
        ParsedEvent::EthBridge {
            direction: if topic0 == *ETH_BRIDGE_INITIATED {
                BridgeDirection::Initiated
            } else {
                BridgeDirection::Finalized
            },
            from: topic_address(log, 1)?,
            to: topic_address(log, 2)?,
            amount: word(&data, 0)?,
        }
    } else if topic0 == *ERC20_BRIDGE_INITIATED || topic0 == *ERC20_BRIDGE_FINALIZED {
        ParsedEvent::Erc20Bridge {
            direction: if topic0 == *ERC20_BRIDGE_INITIATED {
                BridgeDirection::Initiated
            } else {
                BridgeDirection::Finalized
            },
            local_token: topic_address(log, 1)?,
            from: topic_address(log, 3)?,
            to: address_at(&data, 0)?,
            amount: word(&data, 1)?,
        }
    } else if topic0 == *LENDING_SUPPLY {
        ParsedEvent::Supply {
            reserve: topic_address(log, 1)?,
            on_behalf_of: topic_address(log, 2)?,
            user: address_at(&data, 0)?,
            amount: word(&data, 1)?,
        }
    } else if topic0 == *LENDING_WITHDRAW {
        ParsedEvent::Withdraw {
            reserve: topic_address(log, 1)?,
            user: topic_address(log, 2)?,
            amount: word(&data, 0)?,
        }
    } else if topic0 == *LENDING_BORROW {
        ParsedEvent::Borrow {
            reserve: topic_address(log, 1)?,
            on_behalf_of: topic_address(log, 2)?,
            user: address_at(&data, 0)?,
            amount: word(&data, 1)?,
        }
    } else if topic0 == *LENDING_REPAY {
        ParsedEvent::Repay {
            reserve: topic_address(log, 1)?,
            user: topic_address(log, 2)?,
            amount: word(&data, 0)?,
        }
    } else {
        return Err(ParseError::UnknownEvent(topic_hex(&topic0)));
    };

    Ok(event)
}

fn parse_log_entry(entry: &Value) -> Result<ParsedEvent, ParseError> {
    if !entry.is_object() {
        return Err(ParseError::NotAnObject);
    }
    let raw: RawLog = serde_json::from_value(entry.clone()).map_err(|_| ParseError::MissingField("topics"))?;
    parse_log(&raw)
}

/// Decode every log entry, dropping the ones that fail
pub fn parse_logs(logs: &Value) -> Vec<ParsedEvent> {
    as_entries(logs)
        .iter()
        .filter_map(|entry| match parse_log_entry(entry) {
            Ok(event) => Some(event),
            Err(ParseError::UnknownEvent(_)) => None,
            Err(e) => {
                debug!("Skipping log entry: {}", e);
                None
            }
        })
        .collect()
}

fn string_field(entry: &Value, field: &'static str) -> Result<String, ParseError> {
    entry
        .get(field)
        .and_then(Value::as_str)
        .map(|s| s.to_ascii_lowercase())
        .ok_or(ParseError::MissingField(field))
}

pub fn parse_operation(entry: &Value) -> Result<InternalTransfer, ParseError> {
    if !entry.is_object() {
        return Err(ParseError::NotAnObject);
    }

    let value = match entry.get("value") {
        Some(Value::String(raw)) => parse_amount(raw).ok_or(ParseError::InvalidHex {
            field: "value",
            value: raw.clone(),
        })?,
        Some(Value::Number(n)) => n
            .as_u64()
            .map(U256::from)
            .ok_or(ParseError::MissingField("value"))?,
        _ => U256::ZERO,
    };

    Ok(InternalTransfer {
        from: string_field(entry, "from")?,
        to: string_field(entry, "to")?,
        value,
    })
}

/// Decode every call-trace entry, dropping the ones that fail
pub fn parse_operations(operations: &Value) -> Vec<InternalTransfer> {
    as_entries(operations)
        .iter()
        .filter_map(|entry| match parse_operation(entry) {
            Ok(transfer) => Some(transfer),
            Err(e) => {
                debug!("Skipping operation entry: {}", e);
                None
            }
        })
        .collect()
}
