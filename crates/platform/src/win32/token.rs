//! Process token queries: owning account and elevation

use super::handle::{map_error, open_process, OwnedHandle};
use crate::error::{DirResult, DirectoryError};
use std::ffi::c_void;
use windows::core::PWSTR;
use windows::Win32::Foundation::{BOOL, HANDLE, PSID};
use windows::Win32::Security::{
    CheckTokenMembership, CreateWellKnownSid, DuplicateToken, GetTokenInformation,
    LookupAccountSidW, SecurityIdentification, TokenUser, WinBuiltinAdministratorsSid,
    SID_NAME_USE, TOKEN_ACCESS_MASK, TOKEN_DUPLICATE, TOKEN_QUERY, TOKEN_USER,
};
use windows::Win32::System::Threading::{
    GetCurrentProcess, OpenProcessToken, PROCESS_QUERY_LIMITED_INFORMATION,
};

/// Account owning a process token
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TokenAccount {
    pub domain: String,
    pub name: String,
}

impl TokenAccount {
    /// `DOMAIN\name`, or the bare name for domainless accounts
    pub fn qualified(&self) -> String {
        if self.domain.is_empty() {
            self.name.clone()
        } else {
            format!("{}\\{}", self.domain, self.name)
        }
    }
}

/// Largest SID the system can produce (`SECURITY_MAX_SID_SIZE`)
const MAX_SID_SIZE: usize = 68;

fn open_token(process: HANDLE, pid: u32, access: TOKEN_ACCESS_MASK) -> DirResult<OwnedHandle> {
    let mut token = HANDLE::default();
    unsafe { OpenProcessToken(process, access, &mut token) }
        .map_err(|e| map_error(pid, "OpenProcessToken", &e))?;
    Ok(OwnedHandle::new(token))
}

/// Owner of the token of `pid`
pub(crate) fn token_account(pid: u32) -> DirResult<TokenAccount> {
    let process = open_process(pid, PROCESS_QUERY_LIMITED_INFORMATION)?;
    let token = open_token(process.get(), pid, TOKEN_QUERY)?;

    unsafe {
        let mut needed = 0u32;
        let _ = GetTokenInformation(token.get(), TokenUser, None, 0, &mut needed);
        if needed == 0 {
            return Err(DirectoryError::query_failed(
                "GetTokenInformation",
                "Failed to get token info size",
            ));
        }

        // u64 storage keeps TOKEN_USER aligned
        let mut buffer = vec![0u64; (needed as usize).div_ceil(8)];
        GetTokenInformation(
            token.get(),
            TokenUser,
            Some(buffer.as_mut_ptr() as *mut c_void),
            needed,
            &mut needed,
        )
        .map_err(|e| map_error(pid, "GetTokenInformation", &e))?;
        let token_user = &*(buffer.as_ptr() as *const TOKEN_USER);

        let mut name = [0u16; 256];
        let mut domain = [0u16; 256];
        let mut name_len = name.len() as u32;
        let mut domain_len = domain.len() as u32;
        let mut sid_type = SID_NAME_USE::default();

        LookupAccountSidW(
            None,
            token_user.User.Sid,
            PWSTR(name.as_mut_ptr()),
            &mut name_len,
            PWSTR(domain.as_mut_ptr()),
            &mut domain_len,
            &mut sid_type,
        )
        .map_err(|e| DirectoryError::query_failed("LookupAccountSidW", e.message().to_string()))?;

        Ok(TokenAccount {
            domain: String::from_utf16_lossy(&domain[..domain_len as usize]),
            name: String::from_utf16_lossy(&name[..name_len as usize]),
        })
    }
}

/// SID of the BUILTIN\Administrators group, in u64 storage for alignment
fn administrators_sid() -> DirResult<Vec<u64>> {
    let mut buffer = vec![0u64; MAX_SID_SIZE.div_ceil(8)];
    let mut size = MAX_SID_SIZE as u32;
    unsafe {
        CreateWellKnownSid(
            WinBuiltinAdministratorsSid,
            PSID::default(),
            PSID(buffer.as_mut_ptr() as *mut c_void),
            &mut size,
        )
    }
    .map_err(|e| DirectoryError::query_failed("CreateWellKnownSid", e.message().to_string()))?;
    Ok(buffer)
}

/// Whether `token` has the Administrators group enabled
///
/// `CheckTokenMembership` takes an impersonation token; the primary token is
/// duplicated at identification level. A UAC-filtered token carries the
/// group as deny-only and is not a member.
fn token_is_admin(token: &OwnedHandle, pid: u32) -> DirResult<bool> {
    let mut duplicate = HANDLE::default();
    unsafe { DuplicateToken(token.get(), SecurityIdentification, &mut duplicate) }
        .map_err(|e| map_error(pid, "DuplicateToken", &e))?;
    let duplicate = OwnedHandle::new(duplicate);

    let mut sid = administrators_sid()?;
    let mut is_member = BOOL::default();
    unsafe {
        CheckTokenMembership(
            duplicate.get(),
            PSID(sid.as_mut_ptr() as *mut c_void),
            &mut is_member,
        )
    }
    .map_err(|e| map_error(pid, "CheckTokenMembership", &e))?;
    Ok(is_member.as_bool())
}

/// Whether the token of `pid` (the caller when `None`) is an administrator
///
/// Any failure reads as not elevated.
pub(crate) fn is_elevated(pid: Option<u32>) -> bool {
    let access = TOKEN_QUERY | TOKEN_DUPLICATE;
    let result = match pid {
        None => {
            // Pseudo-handle; nothing to close
            let process = unsafe { GetCurrentProcess() };
            let pid = std::process::id();
            open_token(process, pid, access).and_then(|t| token_is_admin(&t, pid))
        }
        Some(pid) => open_process(pid, PROCESS_QUERY_LIMITED_INFORMATION)
            .and_then(|p| open_token(p.get(), pid, access))
            .and_then(|t| token_is_admin(&t, pid)),
    };
    result.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_account() {
        let account = TokenAccount {
            domain: "CONTOSO".into(),
            name: "alice".into(),
        };
        assert_eq!(account.qualified(), "CONTOSO\\alice");

        let local = TokenAccount {
            domain: String::new(),
            name: "SYSTEM".into(),
        };
        assert_eq!(local.qualified(), "SYSTEM");
    }

    #[test]
    fn test_own_account_resolves() {
        let account = token_account(std::process::id()).expect("Should read own token");
        assert!(!account.name.is_empty());
    }

    #[test]
    fn test_own_elevation_is_consistent() {
        assert_eq!(is_elevated(None), is_elevated(Some(std::process::id())));
    }

    #[test]
    fn test_administrators_sid_is_well_formed() {
        let sid = administrators_sid().expect("Should build the Administrators SID");
        let bytes: Vec<u8> = sid.iter().flat_map(|w| w.to_ne_bytes()).collect();
        // S-1-5-32-544: revision 1, two sub-authorities, NT authority
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[1], 2);
        assert_eq!(&bytes[2..8], &[0, 0, 0, 0, 0, 5]);
        assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 32);
        assert_eq!(u32::from_le_bytes(bytes[12..16].try_into().unwrap()), 544);
    }

    #[test]
    fn test_missing_process_is_not_elevated() {
        assert!(!is_elevated(Some(u32::MAX - 1)));
    }
}
