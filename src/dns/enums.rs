/// Declares a wire-coded enum with an `Unknown(u16)` catch-all and the
/// conversions to and from its 16-bit code.
macro_rules! wire_codes {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            #[default]
            $first:ident = $first_code:literal,
            $($variant:ident = $code:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
        pub enum $name {
            #[default]
            $first,
            $($variant,)*
            Unknown(u16),
        }

        impl From<u16> for $name {
            fn from(value: u16) -> Self {
                match value {
                    $first_code => $name::$first,
                    $($code => $name::$variant,)*
                    x => $name::Unknown(x),
                }
            }
        }

        impl From<$name> for u16 {
            fn from(value: $name) -> Self {
                match value {
                    $name::$first => $first_code,
                    $($name::$variant => $code,)*
                    $name::Unknown(x) => x,
                }
            }
        }
    };
}

wire_codes! {
    /// Record and query types this server reads or writes
    pub enum DNSResourceType {
        #[default]
        A = 1,
        NS = 2,
        CNAME = 5,
        SOA = 6,
        PTR = 12,
        MX = 15,
        TXT = 16,
        AAAA = 28,
        SRV = 33,
        OPT = 41,
        IXFR = 251,
        AXFR = 252,
        ANY = 255,
        CAA = 257,
    }
}

wire_codes! {
    pub enum DNSResourceClass {
        #[default]
        IN = 1,
        CS = 2,
        CH = 3,
        HS = 4,
        ANY = 255,
    }
}

/// Response codes used by an authoritative server (RFC 1035, RFC 2136)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseCode {
    NoError = 0,
    FormatError = 1,
    ServerFailure = 2,
    NameError = 3,
    NotImplemented = 4,
    Refused = 5,
    NotAuth = 9,
}

impl From<u8> for ResponseCode {
    fn from(value: u8) -> Self {
        match value {
            0 => ResponseCode::NoError,
            1 => ResponseCode::FormatError,
            3 => ResponseCode::NameError,
            4 => ResponseCode::NotImplemented,
            5 => ResponseCode::Refused,
            9 => ResponseCode::NotAuth,
            _ => ResponseCode::ServerFailure,
        }
    }
}
