use alloy::node_bindings::{Anvil, AnvilInstance};

pub const ANVIL_MNEMONIC: &str = "test test test test test test test test test test test junk";

/// Default anvil dev keys.
pub const ANVIL_KEYS: [&str; 10] = [
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
    "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
    "0x5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a",
    "0x7c852118294e51e653712a81e05800f419141751be58f605c371e15141b007a6",
    "0x47e179ec197488593b187f80a00eb0da91f1b9d0b13f8733639f19c30a34926a",
    "0x8b3a350cf5c34c9194ca85829a2df0ec3153be0318b5e2d3348e872092edffba",
    "0x92db14e403b83dfe3df233f83dfa3a0d7096f21ca9b0d6d6b8d88b2b4ec1564e",
    "0x4bbbf85ce3377467afe5d46f804f221813b2bb87f24d81f60f1fcdbf7cbf4356",
    "0xdbda1821b80551c9d65939329250298aa3472ba22feea921c0cf5d620ea67b97",
    "0x2a871d0798f97d79848a013d4936a73bf4cc922c825d33c1cf7073dff6d409c6",
];

/// `set(uint256)` stores into slot 0, `get()` returns it.
pub const STORAGE_ABI: &str = r#"[
    {"type":"function","name":"set","stateMutability":"nonpayable",
     "inputs":[{"name":"x","type":"uint256"}],"outputs":[]},
    {"type":"function","name":"get","stateMutability":"view",
     "inputs":[],"outputs":[{"name":"","type":"uint256"}]}
]"#;

/// Hand-assembled init code for [`STORAGE_ABI`]: copies a 50-byte runtime that dispatches
/// on the selector, `SSTORE`s calldata[4..36] for `set` and returns slot 0 for `get`.
pub const STORAGE_BIN: &str = concat!(
    "0x603280600b6000396000f3",
    "60003560e01c806360fe47b114601e5780636d4ce63c14602657600080fd",
    "5b60043560005500",
    "5b60005460005260206000f3"
);

/// Init code that reverts immediately.
pub const REVERTING_INIT_CODE: &str = "0x60006000fd";

pub fn spawn_anvil() -> AnvilInstance {
    Anvil::new().block_time(1).try_spawn().unwrap()
}

#[test]
fn storage_runtime_has_expected_length() {
    let code = alloy::hex::decode(STORAGE_BIN).unwrap();
    assert_eq!(code.len(), 11 + 0x32);
}
