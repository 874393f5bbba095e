/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

use zeroize::Zeroize;

/// A fixed-size secret byte string that is wiped from memory when dropped.
///
/// A thin newtype around `[u8; N]` that exists purely to mark key material
/// and make it harder to accidentally leak it into a `Debug` format or a log
/// line.
#[derive(Clone)]
pub struct Secret<const N: usize>(pub [u8; N]);

impl<const N: usize> Secret<N> {
    #[inline]
    pub fn new(b: [u8; N]) -> Self {
        Self(b)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    /// Copy the first `M` bytes out as a new, smaller secret.
    #[inline]
    pub fn first_n<const M: usize>(&self) -> [u8; M] {
        let mut out = [0u8; M];
        out.copy_from_slice(&self.0[..M]);
        out
    }
}

impl<const N: usize> Drop for Secret<N> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<const N: usize> std::fmt::Debug for Secret<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(...)")
    }
}
