/// Fixed-capacity byte buffer with a single cursor, shared by the receive and
/// transmit paths of one slave instance.
///
/// `index` never exceeds `N`.
pub struct TransferBuffer<const N: usize> {
    buf: [u8; N],
    index: usize,
}

impl<const N: usize> TransferBuffer<N> {
    const NON_EMPTY: () = assert!(N > 0, "Transfer buffer capacity must be at least one byte");

    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NON_EMPTY;

        Self {
            buf: [0; N],
            index: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_full(&self) -> bool {
        self.index == N
    }

    pub fn rewind(&mut self) {
        self.index = 0;
    }

    /// Stores `byte` at the cursor. Fails without touching the buffer when full.
    pub fn push(&mut self, byte: u8) -> Result<(), ()> {
        if self.is_full() {
            Err(())
        } else {
            self.buf[self.index] = byte;
            self.index += 1;
            Ok(())
        }
    }

    /// Bytes written since the last rewind.
    pub fn filled(&self) -> &[u8] {
        &self.buf[..self.index]
    }

    /// The whole backing storage, regardless of the cursor.
    pub fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Final byte of the storage, regardless of the cursor.
    pub fn last_byte(&self) -> u8 {
        self.buf[N - 1]
    }

    /// Drops everything buffered and stores `byte` as the first byte.
    pub fn restart_with(&mut self, byte: u8) {
        self.buf[0] = byte;
        self.index = 1;
    }
}

impl<const N: usize> Iterator for TransferBuffer<N> {
    type Item = u8;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_full() {
            None
        } else {
            self.index += 1;
            Some(self.buf[self.index - 1])
        }
    }
}
