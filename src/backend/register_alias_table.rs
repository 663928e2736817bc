use crate::instructions::instructions::{ARCH_REG_CNT, RegisterType, Tag};

/// The renamed state of a source operand.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Operand {
    Ready,
    WaitingOn(Tag),
}

impl Operand {
    pub(crate) fn is_ready(&self) -> bool {
        matches!(self, Operand::Ready)
    }
}

/// The Register Alias Table. This structure is used for the register
/// renaming process. The RAT entry for a given architectural register
/// points to the tag of the latest dispatched producer of that register.
/// As long as such an entry exists, consumers should wait on that tag.
pub(crate) struct RAT {
    table: [Operand; ARCH_REG_CNT],
}

impl RAT {
    pub(crate) fn new() -> Self {
        Self { table: [Operand::Ready; ARCH_REG_CNT] }
    }

    /// 'No register' always resolves to ready.
    pub(crate) fn lookup(&self, arch_reg: Option<RegisterType>) -> Operand {
        match arch_reg {
            Some(arch_reg) => self.table[arch_reg as usize],
            None => Operand::Ready,
        }
    }

    pub(crate) fn bind(&mut self, arch_reg: RegisterType, tag: Tag) {
        self.table[arch_reg as usize] = Operand::WaitingOn(tag);
    }

    /// Marks the register ready, but only when `tag` is still its latest
    /// producer; a newer producer keeps the binding (WAW). Returns true if the
    /// entry was released.
    pub(crate) fn release_if(&mut self, arch_reg: RegisterType, tag: Tag) -> bool {
        let entry = &mut self.table[arch_reg as usize];
        if *entry == Operand::WaitingOn(tag) {
            *entry = Operand::Ready;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initially_ready() {
        let rat = RAT::new();
        for reg in 0..ARCH_REG_CNT {
            assert_eq!(rat.lookup(Some(reg as RegisterType)), Operand::Ready);
        }
        assert_eq!(rat.lookup(None), Operand::Ready);
    }

    #[test]
    fn test_bind_and_release() {
        let mut rat = RAT::new();
        rat.bind(3, 7);
        assert_eq!(rat.lookup(Some(3)), Operand::WaitingOn(7));

        assert!(rat.release_if(3, 7));
        assert_eq!(rat.lookup(Some(3)), Operand::Ready);
    }

    #[test]
    fn test_release_stale_producer() {
        let mut rat = RAT::new();
        rat.bind(3, 1);
        rat.bind(3, 2);

        // the older producer completes first
        assert!(!rat.release_if(3, 1));
        assert_eq!(rat.lookup(Some(3)), Operand::WaitingOn(2));

        assert!(rat.release_if(3, 2));
        assert_eq!(rat.lookup(Some(3)), Operand::Ready);
    }

    #[test]
    fn test_release_other_register() {
        let mut rat = RAT::new();
        rat.bind(3, 1);
        assert!(!rat.release_if(4, 1));
        assert_eq!(rat.lookup(Some(3)), Operand::WaitingOn(1));
    }
}
