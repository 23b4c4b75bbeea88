//! Address parts
//!
//! An address part selects the piece of an address that is matched:
//! the whole address, the local part, the domain, or (with subaddress)
//! the user and detail halves of the local part.

use crate::address::Address;

pub trait AddressPart: Send + Sync {
    fn identifier(&self) -> &'static str;

    /// Code within the owning extension (or the core table)
    fn code(&self) -> u8;

    /// Extract the part; `None` means there is nothing to match
    fn extract(&self, address: &Address, separator: &str) -> Option<String>;
}

#[derive(Debug)]
pub struct AllPart;

pub static ALL: AllPart = AllPart;

impl AddressPart for AllPart {
    fn identifier(&self) -> &'static str {
        "all"
    }

    fn code(&self) -> u8 {
        super::ADDRESS_ALL
    }

    fn extract(&self, address: &Address, _separator: &str) -> Option<String> {
        Some(address.to_string())
    }
}

#[derive(Debug)]
pub struct LocalPart;

pub static LOCALPART: LocalPart = LocalPart;

impl AddressPart for LocalPart {
    fn identifier(&self) -> &'static str {
        "localpart"
    }

    fn code(&self) -> u8 {
        super::ADDRESS_LOCALPART
    }

    fn extract(&self, address: &Address, _separator: &str) -> Option<String> {
        Some(address.local_part.clone())
    }
}

#[derive(Debug)]
pub struct DomainPart;

pub static DOMAIN: DomainPart = DomainPart;

impl AddressPart for DomainPart {
    fn identifier(&self) -> &'static str {
        "domain"
    }

    fn code(&self) -> u8 {
        super::ADDRESS_DOMAIN
    }

    fn extract(&self, address: &Address, _separator: &str) -> Option<String> {
        address.domain.clone()
    }
}

// ===== subaddress =====

pub const ADDRESS_USER: u8 = 0;
pub const ADDRESS_DETAIL: u8 = 1;

#[derive(Debug)]
pub struct UserPart;

pub static USER: UserPart = UserPart;

impl AddressPart for UserPart {
    fn identifier(&self) -> &'static str {
        "user"
    }

    fn code(&self) -> u8 {
        ADDRESS_USER
    }

    fn extract(&self, address: &Address, separator: &str) -> Option<String> {
        let local = address.local_part.as_str();
        let user = match local.find(separator) {
            Some(pos) if !separator.is_empty() => &local[..pos],
            _ => local,
        };
        Some(user.to_string())
    }
}

#[derive(Debug)]
pub struct DetailPart;

pub static DETAIL: DetailPart = DetailPart;

impl AddressPart for DetailPart {
    fn identifier(&self) -> &'static str {
        "detail"
    }

    fn code(&self) -> u8 {
        ADDRESS_DETAIL
    }

    fn extract(&self, address: &Address, separator: &str) -> Option<String> {
        if separator.is_empty() {
            return None;
        }
        let local = address.local_part.as_str();
        local
            .find(separator)
            .map(|pos| local[pos + separator.len()..].to_string())
    }
}
