use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{invalid_enum_value, Error};
use crate::version::SemanticVersion;

/// Client types that may appear in an [EvaluationContext].
pub const ALLOWED_CLIENT_TYPES: &[&str] = &["Web", "Android"];

/// Browser types that may appear in an [EvaluationContext].
pub const ALLOWED_BROWSER_TYPES: &[&str] = &["Chrome", "Edge", "Safari", "Firefox", "Others"];

/// Locale codes of the supported site languages.
pub const ALLOWED_USER_LOCALES: &[&str] = &[
    "ar", "bg", "bn", "de", "el", "en", "es", "fr", "hi", "id", "it", "ja", "kab", "ko", "nl",
    "pl", "pt", "pt-br", "ru", "sv", "tr", "uk", "ur", "vi", "zh-hans", "zh-hant",
];

/// String forms of every [ServerMode], in declaration order.
pub const ALLOWED_SERVER_MODES: &[&str] = &["dev", "test", "prod"];

/// The running environment of the evaluating process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    /// Development servers.
    Dev,
    /// QA / staging servers.
    Test,
    /// Production servers.
    Prod,
}

impl ServerMode {
    /// The lowercase wire form of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerMode::Dev => "dev",
            ServerMode::Test => "test",
            ServerMode::Prod => "prod",
        }
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The client-side half of an evaluation context, as extracted from an
/// inbound request by the handler layer. All four fields are optional; a
/// server-side evaluation carries none of them.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ClientContext {
    /// The client type, e.g. 'Web' or 'Android'.
    pub client_type: Option<String>,
    /// The browser type, e.g. 'Chrome'. None for native clients.
    pub browser_type: Option<String>,
    /// The native application version, e.g. '1.0.0'. None for web clients.
    pub app_version: Option<String>,
    /// The locale code, e.g. 'en'.
    pub user_locale: Option<String>,
}

/// The immutable snapshot of client and server attributes that parameter
/// rules are matched against.
///
/// A context is constructed once per request (or once per server-side
/// evaluation) and never mutated. Validation is separate from construction
/// so the handler layer can map a failure to a client error response.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct EvaluationContext {
    client_type: Option<String>,
    browser_type: Option<String>,
    app_version: Option<String>,
    user_locale: Option<String>,
    server_mode: ServerMode,
}

impl EvaluationContext {
    /// Combines the client-side context with the server mode of the
    /// evaluating process.
    pub fn from_client(client: ClientContext, server_mode: ServerMode) -> Self {
        EvaluationContext {
            client_type: client.client_type,
            browser_type: client.browser_type,
            app_version: client.app_version,
            user_locale: client.user_locale,
            server_mode,
        }
    }

    /// A context for server-side evaluation, carrying no client attributes.
    pub fn for_server(server_mode: ServerMode) -> Self {
        EvaluationContext::from_client(ClientContext::default(), server_mode)
    }

    /// The client type, e.g. 'Web' or 'Android'.
    pub fn client_type(&self) -> Option<&str> {
        self.client_type.as_deref()
    }

    /// The browser type, e.g. 'Chrome'. None if the client is a native app.
    pub fn browser_type(&self) -> Option<&str> {
        self.browser_type.as_deref()
    }

    /// The version of the native application, e.g. '1.0.0'. None if the
    /// client is web.
    pub fn app_version(&self) -> Option<&str> {
        self.app_version.as_deref()
    }

    /// The locale code, e.g. 'en'.
    pub fn user_locale(&self) -> Option<&str> {
        self.user_locale.as_deref()
    }

    /// The server mode of the evaluating process.
    pub fn server_mode(&self) -> ServerMode {
        self.server_mode
    }

    /// Checks every present optional field against its allowed set; absent
    /// fields are always valid.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(client_type) = self.client_type.as_deref() {
            if !ALLOWED_CLIENT_TYPES.contains(&client_type) {
                return Err(invalid_enum_value(
                    "client_type",
                    client_type,
                    ALLOWED_CLIENT_TYPES,
                ));
            }
        }
        if let Some(browser_type) = self.browser_type.as_deref() {
            if !ALLOWED_BROWSER_TYPES.contains(&browser_type) {
                return Err(invalid_enum_value(
                    "browser_type",
                    browser_type,
                    ALLOWED_BROWSER_TYPES,
                ));
            }
        }
        if let Some(app_version) = self.app_version.as_deref() {
            SemanticVersion::from_str(app_version)?;
        }
        if let Some(user_locale) = self.user_locale.as_deref() {
            if !ALLOWED_USER_LOCALES.contains(&user_locale) {
                return Err(invalid_enum_value(
                    "user_locale",
                    user_locale,
                    ALLOWED_USER_LOCALES,
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;
    use test_case::test_case;

    fn full_context() -> EvaluationContext {
        EvaluationContext::from_client(
            ClientContext {
                client_type: Some("Android".to_string()),
                browser_type: None,
                app_version: Some("1.0.0".to_string()),
                user_locale: Some("en".to_string()),
            },
            ServerMode::Dev,
        )
    }

    #[test]
    fn valid_contexts_pass() {
        assert_that!(full_context().validate()).is_ok();
        assert_that!(EvaluationContext::for_server(ServerMode::Prod).validate()).is_ok();
    }

    #[test]
    fn server_context_has_no_client_fields() {
        let context = EvaluationContext::for_server(ServerMode::Test);
        assert_that!(context.client_type()).is_none();
        assert_that!(context.browser_type()).is_none();
        assert_that!(context.app_version()).is_none();
        assert_that!(context.user_locale()).is_none();
        assert_eq!(context.server_mode(), ServerMode::Test);
    }

    #[test]
    fn invalid_client_type_is_named_in_the_error() {
        let mut context = full_context();
        context.client_type = Some("iOS".to_string());
        let err = context.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid client_type 'iOS', must be one of [Web, Android]"
        );
    }

    #[test]
    fn invalid_browser_type_is_named_in_the_error() {
        let mut context = full_context();
        context.browser_type = Some("Netscape".to_string());
        let err = context.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid browser_type 'Netscape', must be one of [Chrome, Edge, Safari, Firefox, Others]"
        );
    }

    #[test_case("1.0"; "missing patch")]
    #[test_case("a.b.c"; "non numeric")]
    #[test_case("1.0.0.0"; "extra component")]
    fn invalid_app_version_fails(version: &str) {
        let mut context = full_context();
        context.app_version = Some(version.to_string());
        let err = context.validate().unwrap_err();
        assert_eq!(err, Error::Parse(version.to_string()));
        assert_eq!(err.to_string(), format!("Invalid version '{}'", version));
    }

    #[test]
    fn invalid_user_locale_is_named_in_the_error() {
        let mut context = full_context();
        context.user_locale = Some("xx".to_string());
        let err = context.validate().unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Invalid user_locale 'xx', must be one of [ar, bg, bn"));
    }

    #[test]
    fn server_mode_serde_uses_lowercase() {
        assert_eq!(
            serde_json::to_string(&ServerMode::Prod).unwrap(),
            r#""prod""#
        );
        let mode: ServerMode = serde_json::from_str(r#""test""#).unwrap();
        assert_eq!(mode, ServerMode::Test);
        assert!(serde_json::from_str::<ServerMode>(r#""staging""#).is_err());
    }
}
