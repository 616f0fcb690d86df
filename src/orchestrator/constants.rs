pub(crate) const CONVERSATION_PATH: &str = "/v1/convai/conversation";
pub(crate) const SIGNED_URL_PATH: &str = "/v1/convai/conversation/get_signed_url";
pub(crate) const API_KEY_HEADER: &str = "xi-api-key";
