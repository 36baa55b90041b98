//! Built-in plugins

pub mod cookie;
pub mod fail_recover;
pub mod form;
pub mod function_route;
pub mod login;

pub use cookie::{merge_cookie_str, CookiePlugin, CookieStore, MemoryCookieJar};
pub use fail_recover::{FailRecoverPlugin, FailRecoverer};
pub use form::FormPlugin;
pub use function_route::{FunctionInvoker, FunctionRoutePlugin};
pub use login::{AuthFailChecker, LoginCenter, LoginPlugin, LoginPluginBuilder, LoginResult};
