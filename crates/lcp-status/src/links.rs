use lcp_types::license::Link;
use lcp_types::status::LicenseStatus;
use lcp_types::{CONTENT_TYPE_LCP_JSON, CONTENT_TYPE_LSD_JSON};

use crate::StatusConfig;

/// Links of a status document. Return and renew are only offered for loans.
pub fn make_links(config: &StatusConfig, ls: &LicenseStatus) -> Vec<Link> {
    let license_ref = &ls.license_ref;
    let base = config.public_base_url.trim_end_matches('/');

    let license_href = match &config.license_link_url {
        Some(template) => template.replace("{license_id}", license_ref),
        None => format!("{}/licenses/{}", config.lcp_base_url.trim_end_matches('/'), license_ref),
    };
    let mut links = vec![Link::new("license", license_href, CONTENT_TYPE_LCP_JSON)];

    if config.register {
        links.push(
            Link::new(
                "register",
                format!("{}/licenses/{}/register{{?id,name}}", base, license_ref),
                CONTENT_TYPE_LSD_JSON,
            )
            .templated(),
        );
    }
    if config.allow_return && ls.is_loan() {
        links.push(
            Link::new(
                "return",
                format!("{}/licenses/{}/return{{?id,name}}", base, license_ref),
                CONTENT_TYPE_LSD_JSON,
            )
            .templated(),
        );
    }
    if config.renew && ls.is_loan() {
        links.push(
            Link::new(
                "renew",
                format!("{}/licenses/{}/renew{{?end,id,name}}", base, license_ref),
                CONTENT_TYPE_LSD_JSON,
            )
            .templated(),
        );
    }

    links
}
