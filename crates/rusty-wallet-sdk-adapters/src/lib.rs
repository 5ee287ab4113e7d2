pub mod config;
pub mod correlator;
pub mod crypto;
pub mod eip712;
pub mod filter;
pub mod key_manager;
pub mod loopback;
pub mod popup;
pub mod provider;
pub mod relay;
pub mod rpc;
pub mod scw_state;
pub mod session;
pub mod signer;
pub mod storage;

pub use config::{ProviderConfig, RuntimeProfile};
pub use correlator::RequestCorrelator;
pub use filter::{FilterPolyfill, FilterResponse};
pub use loopback::LoopbackPopup;
pub use popup::PopupTransport;
pub use provider::{ProviderOptions, WalletProvider};
pub use relay::WalletLinkRelay;
pub use rpc::{ChainRpc, HttpRpcClient, RpcFetch};
pub use signer::{Signer, SignerRegistry};
pub use storage::{MemoryStorage, ScopedStorage};
