macro_rules! table {
    (
        @implement
        $(#[doc = $doc:expr])*
        $name:ident, $flags:expr, $conversion:expr, $deprecated:expr
    ) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name;

        impl crate::tables::Table for $name {
            const NAME: &'static str = stringify!($name);
            const FLAGS: crate::tables::TableFlags = $flags;
            const DUP_CONVERSION: Option<crate::codec::DupLayout> = $conversion;
            const DEPRECATED: bool = $deprecated;
        }
    };

    // Plain table
    (
        $(#[doc = $doc:expr])*
        $name:ident
    ) => {
        table!(@implement
            $(#[doc = $doc])*
            $name,
            crate::tables::TableFlags::DEFAULT,
            None,
            false
        );
    };

    // Dup-sort table
    (
        $(#[doc = $doc:expr])*
        $name:ident is dup_sort
    ) => {
        table!(@implement
            $(#[doc = $doc])*
            $name,
            crate::tables::TableFlags::DUP_SORT,
            None,
            false
        );
    };

    // Dup-sort table with automatic key conversion
    (
        $(#[doc = $doc:expr])*
        $name:ident is dup_sort, auto $from:literal => $to:literal
    ) => {
        table!(@implement
            $(#[doc = $doc])*
            $name,
            crate::tables::TableFlags::DUP_SORT,
            Some(crate::codec::DupLayout::new($from, $to)),
            false
        );
    };

    // Deprecated table
    (
        $(#[doc = $doc:expr])*
        $name:ident is deprecated
    ) => {
        table!(@implement
            $(#[doc = $doc])*
            $name,
            crate::tables::TableFlags::DEFAULT,
            None,
            true
        );
    };
}
