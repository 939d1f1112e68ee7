use typenum::U32;

pub type DepositContractTreeDepth = U32;
