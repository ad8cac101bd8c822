//! A small `macro_rules!` for defining an enum of several known (non-generic)
//! types that all implement a common trait, dispatching by match.
//!
//! Ported from the teacher's `utils/whichever.rs`: used here to give the
//! record reader (`reader.rs`) a single concrete type over a plain file or a
//! gzip-decoding pipe, instead of a boxed trait object.

macro_rules! define_whichever {
    (
        $(#[$meta:meta])*
        $vis:vis enum $struct_name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident($ty:ty)
            ),+
            $(,)?
        }
        $(impl $trait:ident for $struct_name2:ident {$($impl_block:tt)*}),*
    ) => {
        macro_rules! match_macro {
            ($value:expr, $pattern:pat => $result:expr) => {
                match $value {
                    $(
                        $struct_name::$variant($pattern) => $result,
                    )+
                }
            };
        }

        $(#[$meta])*
        $vis enum $struct_name {
            $(
                $(#[$variant_meta])*
                $variant($ty),
            )+
        }

        $(define_whichever!(@impl_trait $struct_name2, $trait, $($impl_block)*);)*
    };

    (@impl_trait $struct_name:ident, Read, $($impl_block:tt)*) => {
        impl ::std::io::Read for $struct_name {
            $($impl_block)*

            #[inline]
            fn read(&mut self, buf: &mut [u8]) -> ::std::io::Result<usize> {
                match_macro!(self, inner => inner.read(buf))
            }

            #[inline]
            fn read_to_end(&mut self, buf: &mut ::std::vec::Vec<u8>) -> ::std::io::Result<usize> {
                match_macro!(self, inner => inner.read_to_end(buf))
            }
        }
    };
}

pub(crate) use define_whichever;
