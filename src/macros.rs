// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Declares a closed set of record kinds together with the static
/// identifier table used to dispatch them.
///
/// ```ignore
/// record_kinds! {
///     pub(crate) enum AiffChunk {
///         Common => b"COMM",
///         SoundData => b"SSND",
///     }
/// }
/// ```
macro_rules! record_kinds {
    ($(#[$meta:meta])* $vis:vis enum $name:ident { $($variant:ident => $code:expr),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        $vis enum $name {
            $($variant,)*
        }

        impl $name {
            /// Every known identifier, in declaration order.
            pub(crate) const TABLE: &'static [($crate::codes::FourCC, $name)] = &[
                $(($crate::codes::FourCC::new(*$code), $name::$variant),)*
            ];

            pub(crate) fn lookup(id: $crate::codes::RecordId) -> Option<Self> {
                let code = id.fourcc()?;
                Self::TABLE.iter().find(|(known, _)| *known == code).map(|&(_, kind)| kind)
            }
        }
    };
}
