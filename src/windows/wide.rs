use std::{
    ffi::OsStr,
    iter::once,
    os::windows::ffi::OsStrExt,
};

/// Encode a string as a null terminated wide string for the `W` family of win32 calls
pub(crate) fn to_wide(s: impl AsRef<OsStr>) -> Vec<u16> {
    s.as_ref().encode_wide().chain(once(0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_terminated() {
        assert_eq!(to_wide("COM3"), vec![67, 79, 77, 51, 0]);
    }
}
