macro_rules! reader {
    ($this:ident) => {
        impl<'bytes> crate::Sealed for $this<'bytes> {}

        impl<'bytes> crate::Reader<crate::Borrowed<'bytes>> for $this<'bytes> {
            type Error = Error;

            fn read(source: crate::Borrowed<'bytes>) -> Result<Self> {
                Self::do_read(crate::containers::Bytes::from_borrowed(source.0))
            }
        }

        impl crate::Reader<&::std::fs::File> for $this<'static> {
            type Error = Error;

            fn read(source: &::std::fs::File) -> Result<Self> {
                let bytes = crate::containers::Bytes::from_file(source)?;
                Self::do_read(bytes)
            }
        }

        impl crate::Reader<&::std::path::Path> for $this<'static> {
            type Error = Error;

            fn read(source: &::std::path::Path) -> Result<Self> {
                let fd = ::std::fs::File::open(source)?;
                Self::read(&fd)
            }
        }
    };
}

pub(crate) use reader;
