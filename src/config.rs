//! Configuration structures for setting up a [`UssdClient`] or [`UssdStream`].
//!
//! A config carries the gateway account used for the login handshake:
//!
//! 1. The account credentials (user name and password). The gateway
//!    protocol transmits these as plaintext XML; wrap the TCP stream in a
//!    transport-level encryption layer if the link is untrusted.
//! 2. The gateway-assigned application id.
//!
//! # Example
//!
//! ```
//! use ussdwire::Config;
//!
//! let config = Config::builder_with_credentials("my_account", "secret")
//!     .with_application_id("USSD_APP_1");
//! ```
//!
//! [`UssdClient`]: crate::UssdClient
//! [`UssdStream`]: crate::tokio_stream_impl::UssdStream

/// Configuration structure for setting up a [`UssdClient`] or [`UssdStream`].
///
/// For details on constructing a config, refer to the [`config`] module.
///
/// [`config`]: crate::config
/// [`UssdClient`]: crate::UssdClient
/// [`UssdStream`]: crate::tokio_stream_impl::UssdStream
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Config {
    pub(crate) username: String,
    pub(crate) password: String,
    pub(crate) application_id: String,
}

/// A builder for creating a [`Config`] instance.
///
/// To get a [`ConfigBuilder`], use [`Config::builder_with_credentials`].
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ConfigBuilder<State> {
    state: State,
}

impl Config {
    /// Sets up the gateway account credentials.
    pub fn builder_with_credentials(
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> ConfigBuilder<WantsApplicationId> {
        ConfigBuilder {
            state: WantsApplicationId {
                username: username.into(),
                password: password.into(),
            },
        }
    }
}

impl ConfigBuilder<WantsApplicationId> {
    /// Sets up the gateway-assigned application id.
    pub fn with_application_id(self, application_id: impl Into<String>) -> Config {
        Config {
            username: self.state.username,
            password: self.state.password,
            application_id: application_id.into(),
        }
    }
}

/// Config builder state where the caller must supply an application id.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct WantsApplicationId {
    username: String,
    password: String,
}
