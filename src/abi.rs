//! Generated contract bindings for the lending protocol's pool and
//! position-manager contracts, the on-chain helper that performs
//! external takes, and a plain ERC-20. These are the transaction
//! builders spec §1 calls an external collaborator, specified here only
//! down to the calldata shapes the rest of the bot needs — the protocol
//! itself (the auction price curve, bucket accounting) is not
//! reimplemented.
//!
//! Generated the same way the teacher's `bindings-aave` crate does:
//! `ethers::contract::abigen!` over a minimal ABI fragment, rather than
//! a full contract-compiler pipeline.

use ethers::contract::abigen;

abigen!(
    Pool,
    r#"[
        function kick(address borrower, uint256 npLimitIndex) external
        function bucketTake(address borrower, bool depositTake, uint256 index) external
        function take(address borrower, uint256 maxAmount, address callee, bytes calldata data) external
        function settle(address borrower, uint256 maxDepth) external returns (uint256, uint256)
        function auctionInfo(address borrower) external view returns (address kicker, uint256 bondFactor, uint256 bondSize, uint256 kickTime, uint256 kickMomp, uint256 neutralPrice, uint256 referencePrice, uint256 thresholdPrice, uint256 debtToCollateral, address)
        function loanInfo(address borrower) external view returns (uint256 debt, uint256 collateral, uint256 npTpRatio)
        function kickerInfo(address kicker) external view returns (uint256 claimable, uint256 locked)
        function bucketInfo(uint256 index) external view returns (uint256 price, uint256 quoteTokens, uint256 collateral, uint256 bucketLP, uint256 scale, uint256 exchangeRate)
        function depositIndex(uint256 debt) external view returns (uint256)
        function hpbIndex() external view returns (uint256)
        function htp() external view returns (uint256)
        function lup() external view returns (uint256)
        function llbIndex() external view returns (uint256)
        function lenderInfo(uint256 index, address lender) external view returns (uint256 lpBalance, uint256 depositTime)
        function collateralAddress() external view returns (address)
        function quoteTokenAddress() external view returns (address)
        function removeQuoteToken(uint256 maxAmount, uint256 index) external returns (uint256, uint256)
        function removeCollateral(uint256 maxAmount, uint256 index) external returns (uint256, uint256)
        function withdrawBonds(address kicker, address recipient, uint256 maxAmount) external returns (uint256)
        event BucketTakeLPAwarded(address indexed taker, address indexed kicker, uint256 lpAwardedTaker, uint256 lpAwardedKicker)
        event BucketTake(address indexed borrower, uint256 index, uint256 amount, uint256 collateral, uint256 bondChange, bool isReward)
        event Kick(address indexed borrower, uint256 debt, uint256 collateral, uint256 bond)
    ]"#
);

abigen!(
    ExternalTakeHelper,
    r#"[
        function takeAndSwap(address pool, address borrower, uint256 maxAmount, address router, uint256 minAmountOut, bytes calldata swapCalldata) external
    ]"#
);

abigen!(
    IERC20,
    r#"[
        function balanceOf(address owner) external view returns (uint256)
        function allowance(address owner, address spender) external view returns (uint256)
        function approve(address spender, uint256 amount) external returns (bool)
        function transfer(address to, uint256 amount) external returns (bool)
        function decimals() external view returns (uint8)
    ]"#
);
