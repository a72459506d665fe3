/// 7-bit slave address.
///
/// Addresses 0x00..=0x07 and 0x78..=0x7F are reserved by the bus protocol and
/// cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Address(u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressError {
    /// Does not fit in 7 bits. 10-bit addressing is not supported.
    OutOfRange(u8),
    /// Falls in one of the reserved address blocks.
    Reserved(u8),
}

impl Address {
    pub const MIN: u8 = 0x08;
    pub const MAX: u8 = 0x77;

    pub const fn new(addr: u8) -> Result<Self, AddressError> {
        match addr {
            Self::MIN..=Self::MAX => Ok(Self(addr)),
            0x80.. => Err(AddressError::OutOfRange(addr)),
            _ => Err(AddressError::Reserved(addr)),
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    /// Address byte as sent on the wire for a master read.
    pub const fn read(self) -> u8 {
        (self.0 << 1) | 1
    }

    /// Address byte as sent on the wire for a master write.
    pub const fn write(self) -> u8 {
        self.0 << 1
    }
}

impl From<Address> for u8 {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl TryFrom<u8> for Address {
    type Error = AddressError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
