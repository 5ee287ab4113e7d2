pub mod domain;
pub mod error;
pub mod message;
pub mod method;
pub mod ports;
pub mod state_machine;
pub mod validation;
pub mod web3;

pub use domain::{
    addresses_value, format_address, format_addresses, AppMetadata, Chain, ConnectInfo,
    Preference, ProviderEvent, ProviderEventKind, RequestArguments, SignerType, WalletOptions,
};
pub use error::{
    is_rejection_message, standard_error_codes, ErrorPayload, ProviderError, SerializedError,
    DEFAULT_ERROR_DOCS_URL, LIB_VERSION,
};
pub use message::{
    EncryptedData, InboundMessage, MessageId, PopupConfig, PopupEvent, PopupMessage, RpcResult,
    ScwHandshakeRequest, ScwRequest, ScwResponse, ScwResponseData, ScwUpdate,
    WalletLinkSessionInfo,
};
pub use method::{determine_method_category, is_filter_method, MethodCategory};
pub use ports::{
    EventHandler, InjectedProviderPort, PopupGeometry, PopupWindowPort, RelayConnectionPort,
    RelayEventSink, RpcTransportPort, StoragePort, UpdateListener, Viewport, WalletLinkRelayPort,
};
pub use state_machine::{ProviderState, StateTransition};
pub use web3::{
    ChainApproval, EthereumTransactionParams, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    RelayChainUpdate, RelayFrame, WatchAssetOptions, Web3Request, Web3Response,
};
