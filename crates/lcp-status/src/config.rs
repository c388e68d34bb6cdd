/// Status server behaviour and public URLs.
#[derive(Debug, Clone)]
pub struct StatusConfig {
    /// Base of the register/return/renew links, e.g. `https://lsd.example.com`.
    pub public_base_url: String,
    /// Base of the issuing server, used for the `license` link.
    pub lcp_base_url: String,
    /// Overrides the `license` link; `{license_id}` is substituted.
    pub license_link_url: Option<String>,
    pub register: bool,
    pub renew: bool,
    pub allow_return: bool,
    /// Default renewal length when the caller gives no end date. 0 disables it.
    pub renew_days: u32,
    /// Loan ceiling counted from issue date. 0 means the license end is the ceiling.
    pub renting_days: u32,
    pub compliance_mode: bool,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:8990".to_string(),
            lcp_base_url: "http://localhost:8989".to_string(),
            license_link_url: None,
            register: true,
            renew: true,
            allow_return: true,
            renew_days: 7,
            renting_days: 0,
            compliance_mode: false,
        }
    }
}
